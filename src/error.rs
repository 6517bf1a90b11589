#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Asset directory {0} not found")]
    AssetNotFound(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Failed to package asset: {0}")]
    Packaging(String),

    #[error("Parsing error: {0}")]
    Parsing(String),

    #[error("Invalid resource name: {0}")]
    InvalidResourceName(String),

    #[error("{0}")]
    Validation(String),

    #[error("Invalid stack name: {0}")]
    InvalidStackName(String),

    #[error("Site {0} not found in sites file")]
    SiteNotFound(String),

    #[error("Failed to serialize: {0}")]
    Serialization(String),

    #[error("Deploy failed: {0}")]
    Deploy(String),
}

pub type Result<T> = std::result::Result<T, Error>;
