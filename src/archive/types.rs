//! Shared types used by the archive client and filing sources.

use reqwest::StatusCode;
use std::fmt;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Periodic report forms the indexer downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FilingType {
    /// Annual report (`10-K`).
    Annual,
    /// Quarterly report (`10-Q`).
    Quarterly,
}

impl FilingType {
    /// EDGAR form code for this filing type.
    pub const fn form(self) -> &'static str {
        match self {
            Self::Annual => "10-K",
            Self::Quarterly => "10-Q",
        }
    }
}

impl fmt::Display for FilingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.form())
    }
}

impl FromStr for FilingType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "10-K" | "10K" | "ANNUAL" => Ok(Self::Annual),
            "10-Q" | "10Q" | "QUARTERLY" => Ok(Self::Quarterly),
            _ => Err(()),
        }
    }
}

/// One unit of download work: the most recent `limit` filings of a form for a ticker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilingRequest {
    /// Upper-cased ticker symbol.
    pub ticker: String,
    /// Requested form.
    pub filing_type: FilingType,
    /// Maximum number of filings to fetch.
    pub limit: NonZeroUsize,
}

/// Errors raised while fetching filings for a single request.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The archive does not list the ticker.
    #[error("Ticker {0} is not known to the archive")]
    UnknownTicker(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Archive responded with an unexpected status code.
    #[error("Unexpected archive response ({status}) for {url}")]
    UnexpectedStatus {
        /// HTTP status returned by the archive.
        status: StatusCode,
        /// Requested URL.
        url: String,
    },
    /// Response body did not match the expected shape.
    #[error("Malformed archive response: {0}")]
    Decode(String),
    /// Writing the filing to the content store failed.
    #[error("Failed to write {path}: {source}")]
    Io {
        /// Target path.
        path: PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of a single fetch as recorded in the [`DownloadReport`].
#[derive(Debug)]
pub struct FetchOutcome {
    /// The request that was attempted.
    pub request: FilingRequest,
    /// Files written on success, or the error that ended the fetch.
    pub result: Result<Vec<PathBuf>, FetchError>,
}

/// Summary of a download stage.
#[derive(Debug, Default)]
pub struct DownloadReport {
    /// One entry per attempted (ticker, form) pair, in request order.
    pub outcomes: Vec<FetchOutcome>,
}

impl DownloadReport {
    /// Number of fetches that were attempted.
    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    /// Number of fetches that failed.
    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.result.is_err())
            .count()
    }

    /// Total number of filing documents written.
    pub fn files_written(&self) -> usize {
        self.outcomes
            .iter()
            .filter_map(|outcome| outcome.result.as_ref().ok())
            .map(Vec::len)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filing_type_round_trips_form_codes() {
        assert_eq!("10-k".parse::<FilingType>(), Ok(FilingType::Annual));
        assert_eq!("Quarterly".parse::<FilingType>(), Ok(FilingType::Quarterly));
        assert_eq!(FilingType::Quarterly.to_string(), "10-Q");
        assert!("10-K/A".parse::<FilingType>().is_err());
    }
}
