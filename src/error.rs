//! Error kinds shared by every layer of the dataset generator.
//!
//! The pipeline distinguishes fatal errors (configuration, search-engine
//! transport, I/O) from per-record failures (validation, bad LLM output),
//! which callers log and skip. Duplicates and missing references are not
//! errors at all: the [`DataStore`](crate::datastore::DataStore) logs them
//! and returns normally.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or incompatible configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The remote service answered with a non-2xx status.
    #[error("HTTP {status} from {url}: {body}")]
    Transport {
        status: u16,
        url: String,
        body: String,
    },

    /// Connection refused, timeout, or any other client-side failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A value failed domain validation (templates, documents, ratings, engine payloads).
    #[error("Validation error: {0}")]
    Validation(String),

    /// The language model returned output that does not match the requested schema.
    #[error("Invalid LLM response: {0}")]
    BadLlmResponse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn bad_llm_response(msg: impl Into<String>) -> Self {
        Self::BadLlmResponse(msg.into())
    }

    /// Whether the error reached the remote service boundary (HTTP status or client failure).
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Http(_))
    }

    /// Process exit code for the `reldata` binary.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 3,
            Self::Transport { .. } | Self::Http(_) => 4,
            Self::Validation(_) => 5,
            Self::BadLlmResponse(_) => 6,
            Self::Io(_) | Self::Json(_) | Self::Csv(_) => 10,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_nonzero() {
        let errors = [
            Error::config("x"),
            Error::validation("x"),
            Error::bad_llm_response("x"),
            Error::Transport {
                status: 500,
                url: "http://localhost".to_string(),
                body: String::new(),
            },
        ];
        for e in &errors {
            assert!(e.exit_code() != 0, "{e} mapped to exit code 0");
        }
    }

    #[test]
    fn test_io_family_exit_code() {
        let io = Error::from(std::io::Error::other("disk full"));
        assert_eq!(io.exit_code(), 10);
        let json = Error::from(serde_json::from_str::<u8>("x").unwrap_err());
        assert_eq!(json.exit_code(), 10);
    }

    #[test]
    fn test_transport_classification() {
        let e = Error::Transport {
            status: 404,
            url: "http://localhost/select".to_string(),
            body: "not found".to_string(),
        };
        assert!(e.is_transport());
        assert!(!Error::validation("bad").is_transport());
        assert_eq!(e.to_string(), "HTTP 404 from http://localhost/select: not found");
    }
}
