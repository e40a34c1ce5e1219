use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("HTML content required")]
    MissingHtml,
    #[error("invalid filename `{filename}`: {reason}")]
    InvalidFilename {
        filename: String,
        reason: &'static str,
    },
}

impl DomainError {
    pub fn invalid_filename(filename: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidFilename {
            filename: filename.into(),
            reason,
        }
    }
}
