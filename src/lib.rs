use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Storage error: {0}")]
    StorageIo(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Dependency error: {0}")]
    Dependency(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RagError {
    /// Stable machine-readable code for this error
    ///
    /// `validation` and `not_found` mean the caller should change its input;
    /// `storage_io` and `dependency` mean the system is unavailable.
    #[inline]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::StorageIo(_) => "storage_io",
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation",
            Self::Dependency(_) => "dependency",
            Self::Config(_) => "config",
        }
    }

    #[inline]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageIo(_) | Self::Dependency(_))
    }

    /// Wrap a collaborator failure, keeping its context chain
    #[inline]
    pub fn dependency(err: &anyhow::Error) -> Self {
        Self::Dependency(format!("{:#}", err))
    }
}

impl From<std::io::Error> for RagError {
    #[inline]
    fn from(err: std::io::Error) -> Self {
        Self::StorageIo(err.to_string())
    }
}

impl From<config::ConfigError> for RagError {
    #[inline]
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

pub mod commands;
pub mod config;
pub mod crawler;
pub mod embeddings;
pub mod ingest;
pub mod llm;
pub mod registry;
pub mod retrieval;
pub mod store;
