use crate::archive::FilingType;
use std::env;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

const DEFAULT_TICKERS: &[&str] = &["AAPL", "MSFT", "TSLA"];
const DEFAULT_USER_NAME: &str = "FinanceAgentProject";
const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_CHUNK_SIZE: usize = 1000;
const DEFAULT_CHUNK_OVERLAP: usize = 100;
const DEFAULT_BATCH_SIZE: usize = 32;
const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";
const DEFAULT_EMBEDDING_DIMENSION: usize = 768;
const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_QDRANT_URL: &str = "http://127.0.0.1:6333";
const DEFAULT_QDRANT_COLLECTION: &str = "sec-filings";
const DEFAULT_ARCHIVE_URL: &str = "https://www.sec.gov";
const DEFAULT_DATA_URL: &str = "https://data.sec.gov";
const DEFAULT_REQUEST_INTERVAL_MS: u64 = 100;

/// Separators tried in order when looking for a chunk boundary.
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

/// Errors encountered while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
    /// Chunk size and overlap cannot produce a terminating split.
    #[error("Invalid chunking parameters: chunk size {chunk_size}, overlap {overlap}")]
    InvalidChunking {
        /// Maximum characters per chunk.
        chunk_size: usize,
        /// Characters shared between adjacent chunks.
        overlap: usize,
    },
    /// Archive downloads need an identifying contact address.
    #[error("SEC_EMAIL must be set to a contact address before downloading filings")]
    MissingContact,
}

/// Identity sent to the archive with every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactIdentity {
    /// Requester or project name.
    pub name: String,
    /// Contact e-mail address.
    pub email: String,
}

impl ContactIdentity {
    /// Build the `User-Agent` value EDGAR expects (`"Name email@domain"`).
    pub fn user_agent(&self) -> String {
        format!("{} {}", self.name, self.email)
    }
}

/// Settings for the archive download stage.
#[derive(Debug, Clone)]
pub struct ArchiveSettings {
    /// Contact identity; `None` is only accepted when downloads are disabled.
    pub contact: Option<ContactIdentity>,
    /// Tickers to download filings for.
    pub tickers: Vec<String>,
    /// Filing forms requested per ticker.
    pub filing_types: Vec<FilingType>,
    /// Most-recent filings fetched per (ticker, form).
    pub limit_per_type: NonZeroUsize,
    /// Base URL for `www.sec.gov` resources.
    pub archive_url: String,
    /// Base URL for `data.sec.gov` resources.
    pub data_url: String,
    /// Minimum delay between archive requests, in milliseconds.
    pub request_interval_ms: u64,
}

/// Chunk sizing policy, in characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkingSettings {
    /// Maximum characters per chunk.
    pub chunk_size: usize,
    /// Characters shared between adjacent chunks.
    pub overlap: usize,
    /// Separators tried from coarse to fine.
    pub separators: Vec<String>,
}

impl ChunkingSettings {
    /// Build settings with the default separator ladder.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ConfigError> {
        let settings = Self {
            chunk_size,
            overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Reject sizes that could not terminate or would exceed the chunk bound.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 || self.overlap >= self.chunk_size {
            return Err(ConfigError::InvalidChunking {
                chunk_size: self.chunk_size,
                overlap: self.overlap,
            });
        }
        Ok(())
    }
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Deterministic hashing embedder for offline runs.
    Hash,
}

impl FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "hash" | "hashing" => Ok(Self::Hash),
            _ => Err(()),
        }
    }
}

/// Embedding model settings.
#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    /// Backend used to produce vectors.
    pub provider: EmbeddingProvider,
    /// Model identifier passed to the provider.
    pub model: String,
    /// Dimensionality of the produced vectors.
    pub dimension: usize,
    /// Number of chunks sent per embedding call.
    pub batch_size: usize,
    /// Base URL of the Ollama runtime.
    pub ollama_url: String,
}

/// Supported vector index backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexBackend {
    /// Append-only segment store under `INDEX_DIR`.
    Local,
    /// Remote Qdrant collection.
    Qdrant,
}

impl FromStr for IndexBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "qdrant" => Ok(Self::Qdrant),
            _ => Err(()),
        }
    }
}

/// Vector index settings.
#[derive(Debug, Clone)]
pub struct IndexSettings {
    /// Which backend receives the vectors.
    pub backend: IndexBackend,
    /// Directory holding the local index.
    pub index_dir: PathBuf,
    /// Base URL of the Qdrant instance.
    pub qdrant_url: String,
    /// Target Qdrant collection.
    pub qdrant_collection: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
}

/// Immutable runtime configuration handed to every pipeline stage.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether the download stage runs before indexing.
    pub run_download: bool,
    /// Root of the local filing content store.
    pub sec_dir: PathBuf,
    /// File suffixes the loader accepts.
    pub file_extensions: Vec<String>,
    /// Number of files parsed concurrently.
    pub loader_concurrency: NonZeroUsize,
    /// Archive download settings.
    pub archive: ArchiveSettings,
    /// Chunking policy.
    pub chunking: ChunkingSettings,
    /// Embedding settings.
    pub embedding: EmbeddingSettings,
    /// Index settings.
    pub index: IndexSettings,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Malformed values are rejected here; cross-field checks run in [`Config::validate`] so that
    /// command-line overrides can be applied first.
    pub fn from_env() -> Result<Self, ConfigError> {
        let data_dir = PathBuf::from(
            load_env_optional("DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()),
        );
        let run_download = load_env_optional("RUN_DOWNLOAD")
            .map(|value| parse_bool("RUN_DOWNLOAD", &value))
            .transpose()?
            .unwrap_or(true);

        let contact = load_env_optional("SEC_EMAIL").map(|email| ContactIdentity {
            name: load_env_optional("SEC_USER_NAME")
                .unwrap_or_else(|| DEFAULT_USER_NAME.to_string()),
            email: email.trim().to_string(),
        });

        let tickers = load_env_optional("TICKERS")
            .map(|value| parse_tickers(&value))
            .unwrap_or_else(|| DEFAULT_TICKERS.iter().map(|t| t.to_string()).collect());

        let filing_types = match load_env_optional("FILING_TYPES") {
            Some(value) => parse_filing_types(&value)?,
            None => vec![FilingType::Annual, FilingType::Quarterly],
        };

        let chunking = ChunkingSettings {
            chunk_size: parse_or("CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?,
            overlap: parse_or("CHUNK_OVERLAP", DEFAULT_CHUNK_OVERLAP)?,
            ..ChunkingSettings::default()
        };

        let config = Self {
            run_download,
            sec_dir: load_env_optional("SEC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("sec_filings")),
            file_extensions: load_env_optional("FILE_EXTENSIONS")
                .map(|value| split_list(&value))
                .unwrap_or_else(|| vec!["html".to_string(), "htm".to_string()]),
            loader_concurrency: match load_env_optional("LOADER_CONCURRENCY") {
                Some(value) => parse_non_zero("LOADER_CONCURRENCY", &value)?,
                None => std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN),
            },
            archive: ArchiveSettings {
                contact,
                tickers,
                filing_types,
                limit_per_type: match load_env_optional("FILING_LIMIT") {
                    Some(value) => parse_non_zero("FILING_LIMIT", &value)?,
                    None => NonZeroUsize::MIN,
                },
                archive_url: load_env_optional("SEC_ARCHIVE_URL")
                    .unwrap_or_else(|| DEFAULT_ARCHIVE_URL.to_string()),
                data_url: load_env_optional("SEC_DATA_URL")
                    .unwrap_or_else(|| DEFAULT_DATA_URL.to_string()),
                request_interval_ms: parse_or(
                    "SEC_REQUEST_INTERVAL_MS",
                    DEFAULT_REQUEST_INTERVAL_MS,
                )?,
            },
            chunking,
            embedding: EmbeddingSettings {
                provider: match load_env_optional("EMBEDDING_PROVIDER") {
                    Some(value) => value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".into()))?,
                    None => EmbeddingProvider::Ollama,
                },
                model: load_env_optional("EMBEDDING_MODEL")
                    .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
                dimension: parse_or("EMBEDDING_DIMENSION", DEFAULT_EMBEDDING_DIMENSION)?,
                batch_size: parse_or("EMBEDDING_BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
                ollama_url: load_env_optional("OLLAMA_URL")
                    .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            },
            index: IndexSettings {
                backend: match load_env_optional("INDEX_BACKEND") {
                    Some(value) => value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("INDEX_BACKEND".into()))?,
                    None => IndexBackend::Local,
                },
                index_dir: load_env_optional("INDEX_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| data_dir.join("vector_db")),
                qdrant_url: load_env_optional("QDRANT_URL")
                    .unwrap_or_else(|| DEFAULT_QDRANT_URL.to_string()),
                qdrant_collection: load_env_optional("QDRANT_COLLECTION_NAME")
                    .unwrap_or_else(|| DEFAULT_QDRANT_COLLECTION.to_string()),
                qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            },
        };

        tracing::debug!(
            run_download = config.run_download,
            sec_dir = %config.sec_dir.display(),
            index_dir = %config.index.index_dir.display(),
            tickers = ?config.archive.tickers,
            chunk_size = config.chunking.chunk_size,
            overlap = config.chunking.overlap,
            provider = ?config.embedding.provider,
            backend = ?config.index.backend,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Check cross-field invariants. Call again after applying overrides.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chunking.validate()?;

        if self.embedding.dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_BATCH_SIZE".into()));
        }
        if self.file_extensions.is_empty() {
            return Err(ConfigError::InvalidValue("FILE_EXTENSIONS".into()));
        }

        if self.run_download {
            match &self.archive.contact {
                Some(contact) if is_plausible_email(&contact.email) => {}
                _ => return Err(ConfigError::MissingContact),
            }
            if self.archive.tickers.is_empty() {
                return Err(ConfigError::InvalidValue("TICKERS".into()));
            }
        }
        Ok(())
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_or<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match load_env_optional(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

fn parse_non_zero(key: &str, value: &str) -> Result<NonZeroUsize, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(key.to_string()))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue(key.to_string())),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a comma separated ticker list, upper-casing and dropping duplicates.
pub fn parse_tickers(value: &str) -> Vec<String> {
    let mut tickers: Vec<String> = Vec::new();
    for ticker in split_list(value) {
        let upper = ticker.to_uppercase();
        if !tickers.contains(&upper) {
            tickers.push(upper);
        }
    }
    tickers
}

fn parse_filing_types(value: &str) -> Result<Vec<FilingType>, ConfigError> {
    let mut types = Vec::new();
    for item in split_list(value) {
        let filing_type: FilingType = item
            .parse()
            .map_err(|()| ConfigError::InvalidValue("FILING_TYPES".into()))?;
        if !types.contains(&filing_type) {
            types.push(filing_type);
        }
    }
    if types.is_empty() {
        return Err(ConfigError::InvalidValue("FILING_TYPES".into()));
    }
    Ok(types)
}

fn is_plausible_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.'),
        None => false,
    }
}
