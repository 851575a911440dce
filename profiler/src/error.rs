//! Top-level error type: wraps each crate's own taxonomy plus the errors
//! specific to configuration loading and region resolution that only the
//! orchestrator can diagnose.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("region resolution error: {0}")]
    Resolve(String),

    #[error(transparent)]
    Reader(#[from] nrg::Error),

    #[error(transparent)]
    DebugInfo(#[from] dbginfo::Error),

    #[error(transparent)]
    Trace(#[from] trace::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn config(msg: impl std::fmt::Display) -> Self {
        Error::Config(msg.to_string())
    }

    pub fn resolve(msg: impl std::fmt::Display) -> Self {
        Error::Resolve(msg.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
