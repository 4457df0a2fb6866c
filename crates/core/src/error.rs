use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Missing required configuration: {}", .0.join(", "))]
    Configuration(Vec<String>),

    #[error("Configuration parse error: {0}")]
    ConfigParse(String),

    #[error("Build folder ({}) not found. Build the site first.", .0.display())]
    MissingArtifact(PathBuf),

    #[error("Upload to s3://{bucket} failed: {message}")]
    Sync { bucket: String, message: String },

    #[error("Cache invalidation for {distribution_id} failed: {message}")]
    Invalidation {
        distribution_id: String,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn sync(bucket: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Sync {
            bucket: bucket.into(),
            message: message.into(),
        }
    }

    pub fn invalidation(distribution_id: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Invalidation {
            distribution_id: distribution_id.into(),
            message: message.into(),
        }
    }

    /// Process exit code for this failure. Never zero.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Configuration(_) | Error::ConfigParse(_) => 10,
            Error::MissingArtifact(_) => 11,
            Error::Sync { .. } => 20,
            Error::Invalidation { .. } => 21,
            Error::Io(_) => 30,
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::ConfigParse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
