use std::fmt;

/// Stable error taxonomy shared by every reader in this crate: setup
/// failures, malformed firmware/sysfs data, and read failures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No sockets/devices found, an empty mask, an unsupported platform, or
    /// a GPU library that failed to initialize.
    #[error("setup error: {0}")]
    Setup(String),

    /// A sysfs/firmware structure did not have the expected shape
    /// (unrecognized RAPL domain name, invalid OCC header/entry).
    #[error("format error: {0}")]
    Format(String),

    /// A read of an already-open counter failed (I/O error, vendor call
    /// failed, both OCC ping and pong invalid).
    #[error("read error: {0}")]
    Read(String),
}

impl Error {
    pub fn setup(msg: impl fmt::Display) -> Self {
        Error::Setup(msg.to_string())
    }
    pub fn format(msg: impl fmt::Display) -> Self {
        Error::Format(msg.to_string())
    }
    pub fn read(msg: impl fmt::Display) -> Self {
        Error::Read(msg.to_string())
    }

    /// The stable numeric discriminant, mirrored from
    /// `original_source/nrg/src/error_codes.hpp`'s `error_code` enum.
    pub fn code(&self) -> u32 {
        match self {
            Error::Setup(_) => 4,
            Error::Format(_) => 2,
            Error::Read(_) => 3,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Read(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
