use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown task: {0}")]
    UnknownTask(String),
}

pub type Result<T> = std::result::Result<T, CatalogError>;
