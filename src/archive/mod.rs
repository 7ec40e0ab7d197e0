//! Filing acquisition from the SEC EDGAR archive.

pub mod client;
pub mod edgar;
pub mod types;

pub use client::{ArchiveClient, FilingSource};
pub use edgar::EdgarSource;
pub use types::{DownloadReport, FetchError, FetchOutcome, FilingRequest, FilingType};

/// Directory the archive layout is nested under inside the content store.
pub const FILINGS_SUBDIR: &str = "sec-edgar-filings";
