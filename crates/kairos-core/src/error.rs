use thiserror::Error;

#[derive(Debug, Error)]
pub enum KairosError {
    #[error("Configuration error: {0}")]
    Config(String),
}

impl KairosError {
    /// Short, stable error code for logs and API responses.
    pub fn code(&self) -> &'static str {
        match self {
            KairosError::Config(_) => "CONFIG_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, KairosError>;
