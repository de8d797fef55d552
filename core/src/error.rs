use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("undecodable response from {url}: {details}")]
    Decode { url: String, details: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("source {section} failed: {details}")]
    Source { section: String, details: String },

    #[error("geocoding failed for {place}: {details}")]
    Geocoding { place: String, details: String },

    #[error("failed to persist {path}: {details}")]
    Persistence { path: String, details: String },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn source_failure(section: impl Into<String>, details: impl ToString) -> Self {
        Error::Source {
            section: section.into(),
            details: details.to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Http(_) | Error::Decode { .. } | Error::Io(_))
    }

    /// Errors that must stop the current run instead of being recorded.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::Validation(_)
                | Error::Geocoding { .. }
                | Error::Persistence { .. }
        )
    }

    /// True when the failure is a TLS certificate verification problem.
    pub fn is_certificate_error(&self) -> bool {
        match self {
            Error::Http(e) => {
                let mut current: Option<&(dyn std::error::Error + 'static)> = Some(e);
                while let Some(err) = current {
                    let text = err.to_string().to_ascii_lowercase();
                    if text.contains("certificate") || text.contains("unknownissuer") {
                        return true;
                    }
                    current = err.source();
                }
                false
            }
            _ => false,
        }
    }
}
