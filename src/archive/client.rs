//! Download stage: fans requests out per (ticker, form) and isolates failures.

use crate::archive::types::{DownloadReport, FetchError, FetchOutcome, FilingRequest, FilingType};
use async_trait::async_trait;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

/// Source of filing documents, such as the EDGAR archive.
#[async_trait]
pub trait FilingSource: Send + Sync {
    /// Fetch up to `request.limit` filings and write them under `destination`.
    ///
    /// Returns the paths of the documents written.
    async fn fetch(
        &self,
        request: &FilingRequest,
        destination: &Path,
    ) -> Result<Vec<PathBuf>, FetchError>;
}

/// Drives a [`FilingSource`] over every configured ticker and filing type.
pub struct ArchiveClient {
    source: Box<dyn FilingSource>,
}

impl ArchiveClient {
    /// Wrap a filing source.
    pub fn new(source: Box<dyn FilingSource>) -> Self {
        Self { source }
    }

    /// Fetch the most recent filings for each (ticker, filing type) pair.
    ///
    /// A failed fetch is logged and recorded in the report; remaining requests still run.
    pub async fn download(
        &self,
        tickers: &[String],
        filing_types: &[FilingType],
        limit_per_type: NonZeroUsize,
        destination: &Path,
    ) -> DownloadReport {
        let mut report = DownloadReport::default();

        for ticker in tickers {
            tracing::info!(ticker = %ticker, "Downloading filings");
            for filing_type in filing_types {
                let request = FilingRequest {
                    ticker: ticker.clone(),
                    filing_type: *filing_type,
                    limit: limit_per_type,
                };
                let result = self.source.fetch(&request, destination).await;
                match &result {
                    Ok(paths) => tracing::debug!(
                        ticker = %ticker,
                        form = %filing_type,
                        files = paths.len(),
                        "Fetched filings"
                    ),
                    Err(error) => tracing::warn!(
                        ticker = %ticker,
                        form = %filing_type,
                        error = %error,
                        "Fetch failed; continuing with remaining requests"
                    ),
                }
                report.outcomes.push(FetchOutcome { request, result });
            }
        }

        tracing::info!(
            attempted = report.attempted(),
            failed = report.failed(),
            files = report.files_written(),
            "Download stage finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSource {
        calls: Mutex<Vec<(String, FilingType)>>,
        failing_ticker: Option<String>,
    }

    #[async_trait]
    impl FilingSource for RecordingSource {
        async fn fetch(
            &self,
            request: &FilingRequest,
            destination: &Path,
        ) -> Result<Vec<PathBuf>, FetchError> {
            self.calls
                .lock()
                .unwrap()
                .push((request.ticker.clone(), request.filing_type));
            if self.failing_ticker.as_deref() == Some(request.ticker.as_str()) {
                return Err(FetchError::UnknownTicker(request.ticker.clone()));
            }
            Ok(vec![destination.join(&request.ticker)])
        }
    }

    struct Shared(std::sync::Arc<RecordingSource>);

    #[async_trait]
    impl FilingSource for Shared {
        async fn fetch(
            &self,
            request: &FilingRequest,
            destination: &Path,
        ) -> Result<Vec<PathBuf>, FetchError> {
            self.0.fetch(request, destination).await
        }
    }

    #[tokio::test]
    async fn issues_one_fetch_per_ticker_and_form() {
        let source = std::sync::Arc::new(RecordingSource::default());
        let client = ArchiveClient::new(Box::new(Shared(source.clone())));
        let tickers = vec!["AAPL".to_string(), "MSFT".to_string()];

        let report = client
            .download(
                &tickers,
                &[FilingType::Annual, FilingType::Quarterly],
                NonZeroUsize::MIN,
                Path::new("/tmp/filings"),
            )
            .await;

        assert_eq!(report.attempted(), 4);
        assert_eq!(report.failed(), 0);
        assert_eq!(source.calls.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn failure_for_one_ticker_does_not_stop_the_next() {
        let source = std::sync::Arc::new(RecordingSource {
            failing_ticker: Some("AAPL".into()),
            ..RecordingSource::default()
        });
        let client = ArchiveClient::new(Box::new(Shared(source.clone())));
        let tickers = vec!["AAPL".to_string(), "MSFT".to_string()];

        let report = client
            .download(
                &tickers,
                &[FilingType::Annual, FilingType::Quarterly],
                NonZeroUsize::MIN,
                Path::new("/tmp/filings"),
            )
            .await;

        assert_eq!(report.attempted(), 4);
        assert_eq!(report.failed(), 2);
        let calls = source.calls.lock().unwrap();
        let msft_calls: Vec<_> = calls.iter().filter(|(t, _)| t == "MSFT").collect();
        assert_eq!(msft_calls.len(), 2);
        assert_eq!(report.files_written(), 2);
    }
}
