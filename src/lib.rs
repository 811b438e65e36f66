// MedRef - Rust Implementation
// A medical reference catalog over a key-value store

#![warn(rust_2018_idioms)]

pub mod catalog;
pub mod config;
pub mod metrics;
pub mod model;
pub mod server;
pub mod storage;

// Re-exports for convenience
pub use catalog::Catalog;
pub use config::AppConfig;
pub use model::{Kind, Lang};
pub use storage::{KvStore, MemoryStore, Storage};

/// MedRef error types
pub mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum Error {
        #[error("Invalid argument: {0}")]
        InvalidArgument(String),

        #[error("Decode error: {0}")]
        Decode(String),

        #[error("Not found: {0}")]
        NotFound(String),

        #[error("Store error: {0}")]
        Store(String),

        #[error("Connection pool exhausted: {0}")]
        Pool(String),

        #[error("Corrupt record {namespace}:{id}: {reason}")]
        Corrupt {
            namespace: String,
            id: u64,
            reason: String,
        },

        #[error("Configuration error: {0}")]
        Config(String),

        #[error("Internal error: {0}")]
        Internal(String),
    }

    impl Error {
        /// Malformed input that the caller must fix before retrying.
        pub fn is_client_error(&self) -> bool {
            matches!(self, Error::InvalidArgument(_) | Error::Decode(_))
        }
    }

    impl From<serde_json::Error> for Error {
        fn from(e: serde_json::Error) -> Self {
            Error::Decode(e.to_string())
        }
    }

    impl From<config::ConfigError> for Error {
        fn from(e: config::ConfigError) -> Self {
            Error::Config(e.to_string())
        }
    }

    impl From<std::io::Error> for Error {
        fn from(e: std::io::Error) -> Self {
            Error::Internal(format!("I/O failure: {}", e))
        }
    }

    #[cfg(feature = "redis")]
    impl From<redis::RedisError> for Error {
        fn from(e: redis::RedisError) -> Self {
            Error::Store(e.to_string())
        }
    }

    pub type Result<T> = std::result::Result<T, Error>;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::error::Error;
    use super::*;

    #[test]
    fn test_version_format() {
        let _version: &str = VERSION;
    }

    #[test]
    fn test_client_error_classification() {
        assert!(Error::InvalidArgument("id".into()).is_client_error());
        assert!(Error::Decode("json".into()).is_client_error());
        assert!(!Error::Store("down".into()).is_client_error());
        let corrupt = Error::Corrupt {
            namespace: "drug".into(),
            id: 7,
            reason: "field count".into(),
        };
        assert!(!corrupt.is_client_error());
        assert!(corrupt.to_string().contains("drug:7"));
    }
}
