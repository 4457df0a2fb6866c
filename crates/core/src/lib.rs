pub mod config;
pub mod error;
pub mod types;

pub use config::{ConfigFile, DeploymentConfig, Overrides, load_config_file};
pub use error::{Error, Result};
pub use types::*;
