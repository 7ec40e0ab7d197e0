//! EDGAR-backed [`FilingSource`].
//!
//! Resolution happens in three hops: the ticker is mapped to a CIK through
//! `files/company_tickers.json`, the filer's submission history lists recent accessions by form,
//! and each selected accession's primary document is downloaded from the `Archives` tree. Every
//! request carries the contact `User-Agent` EDGAR requires and is spaced by a minimum interval to
//! stay under the fair-access rate limit.

use crate::archive::FILINGS_SUBDIR;
use crate::archive::client::FilingSource;
use crate::archive::types::{FetchError, FilingRequest};
use crate::config::{ArchiveSettings, ContactIdentity};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};
use tokio::time::Instant;

/// HTTP client for the SEC EDGAR archive.
pub struct EdgarSource {
    client: Client,
    archive_url: String,
    data_url: String,
    interval: Duration,
    last_request: Mutex<Option<Instant>>,
    ciks: OnceCell<HashMap<String, u64>>,
}

impl EdgarSource {
    /// Build a source that identifies itself with `contact`.
    pub fn new(contact: &ContactIdentity, settings: &ArchiveSettings) -> Result<Self, FetchError> {
        let client = Client::builder().user_agent(contact.user_agent()).build()?;
        tracing::debug!(
            archive_url = %settings.archive_url,
            data_url = %settings.data_url,
            interval_ms = settings.request_interval_ms,
            "Initialized EDGAR client"
        );
        Ok(Self {
            client,
            archive_url: settings.archive_url.trim_end_matches('/').to_string(),
            data_url: settings.data_url.trim_end_matches('/').to_string(),
            interval: Duration::from_millis(settings.request_interval_ms),
            last_request: Mutex::new(None),
            ciks: OnceCell::new(),
        })
    }

    async fn resolve_cik(&self, ticker: &str) -> Result<u64, FetchError> {
        let ciks = self
            .ciks
            .get_or_try_init(|| async {
                let url = format!("{}/files/company_tickers.json", self.archive_url);
                let entries: HashMap<String, CompanyTicker> = self
                    .get(&url)
                    .await?
                    .json()
                    .await
                    .map_err(|error| FetchError::Decode(error.to_string()))?;
                tracing::debug!(companies = entries.len(), "Loaded ticker map");
                Ok::<_, FetchError>(
                    entries
                        .into_values()
                        .map(|entry| (entry.ticker.to_uppercase(), entry.cik_str))
                        .collect(),
                )
            })
            .await?;

        ciks.get(&ticker.to_uppercase())
            .copied()
            .ok_or_else(|| FetchError::UnknownTicker(ticker.to_string()))
    }

    async fn recent_filings(&self, cik: u64) -> Result<RecentFilings, FetchError> {
        let url = format!("{}/submissions/CIK{cik:010}.json", self.data_url);
        let submissions: Submissions = self
            .get(&url)
            .await?
            .json()
            .await
            .map_err(|error| FetchError::Decode(error.to_string()))?;
        Ok(submissions.filings.recent)
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        self.throttle().await;
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::UnexpectedStatus {
                status,
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    async fn throttle(&self) {
        if self.interval.is_zero() {
            return;
        }
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.interval {
                tokio::time::sleep(self.interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[async_trait]
impl FilingSource for EdgarSource {
    async fn fetch(
        &self,
        request: &FilingRequest,
        destination: &Path,
    ) -> Result<Vec<PathBuf>, FetchError> {
        let cik = self.resolve_cik(&request.ticker).await?;
        let recent = self.recent_filings(cik).await?;
        let selected = recent.select(request.filing_type.form(), request.limit.get());
        if selected.is_empty() {
            tracing::info!(
                ticker = %request.ticker,
                form = %request.filing_type,
                "No filings of this form listed"
            );
        }

        let mut written = Vec::with_capacity(selected.len());
        for filing in selected {
            if !is_accession_number(&filing.accession_number) {
                return Err(FetchError::Decode(format!(
                    "invalid accession number {:?}",
                    filing.accession_number
                )));
            }
            let url = format!(
                "{}/Archives/edgar/data/{cik}/{}/{}",
                self.archive_url,
                filing.accession_number.replace('-', ""),
                filing.primary_document
            );
            let body = self.get(&url).await?.bytes().await?;

            let directory = filing_directory(
                destination,
                &request.ticker,
                request.filing_type.form(),
                &filing.accession_number,
            );
            let path = directory.join(format!(
                "primary-document.{}",
                document_extension(&filing.primary_document)
            ));
            tokio::fs::create_dir_all(&directory)
                .await
                .map_err(|source| FetchError::Io {
                    path: directory.clone(),
                    source,
                })?;
            tokio::fs::write(&path, &body)
                .await
                .map_err(|source| FetchError::Io {
                    path: path.clone(),
                    source,
                })?;
            tracing::debug!(
                ticker = %request.ticker,
                accession = %filing.accession_number,
                filed = %filing.filing_date,
                bytes = body.len(),
                path = %path.display(),
                "Saved filing"
            );
            written.push(path);
        }
        Ok(written)
    }
}

/// Directory a filing's documents are written to inside the content store.
pub fn filing_directory(root: &Path, ticker: &str, form: &str, accession: &str) -> PathBuf {
    root.join(FILINGS_SUBDIR)
        .join(ticker.to_uppercase())
        .join(form)
        .join(accession)
}

/// Accession numbers are digits and dashes only; anything else is rejected before it reaches a path.
fn is_accession_number(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_digit() || c == '-')
}

fn document_extension(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "html".to_string())
}

#[derive(Deserialize)]
struct CompanyTicker {
    cik_str: u64,
    ticker: String,
}

#[derive(Deserialize)]
struct Submissions {
    filings: SubmissionFilings,
}

#[derive(Deserialize)]
struct SubmissionFilings {
    recent: RecentFilings,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RecentFilings {
    #[serde(default)]
    accession_number: Vec<String>,
    #[serde(default)]
    form: Vec<String>,
    #[serde(default)]
    primary_document: Vec<String>,
    #[serde(default)]
    filing_date: Vec<String>,
}

struct SelectedFiling {
    accession_number: String,
    primary_document: String,
    filing_date: String,
}

impl RecentFilings {
    /// Most recent `limit` rows whose form matches exactly (amendments are excluded).
    fn select(self, form: &str, limit: usize) -> Vec<SelectedFiling> {
        let mut dates = self.filing_date.into_iter();
        self.accession_number
            .into_iter()
            .zip(self.form)
            .zip(self.primary_document)
            .map(|((accession_number, row_form), primary_document)| {
                let filing_date = dates.next().unwrap_or_default();
                (row_form, accession_number, primary_document, filing_date)
            })
            .filter(|(row_form, _, primary_document, _)| {
                row_form == form && !primary_document.is_empty()
            })
            .take(limit)
            .map(
                |(_, accession_number, primary_document, filing_date)| SelectedFiling {
                    accession_number,
                    primary_document,
                    filing_date,
                },
            )
            .collect()
    }
}
