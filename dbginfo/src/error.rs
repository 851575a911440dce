use std::fmt;

/// Error taxonomy for the debug-info index, mirrored from
/// `original_source/src/dbg/error.hpp`'s `errc` enum and
/// `original_source/src/dbg/utility_funcs.hpp`'s `util_errc` enum.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// The file is not a valid ELF object, or has an unsupported `e_type`.
    #[error("setup error: {0}")]
    Setup(String),

    /// `.symtab`/DWARF structure did not have the expected shape.
    #[error("format error: {0}")]
    Format(String),

    /// Compilation unit / symbol / line / function could not be found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Ambiguous, plain.
    #[error("ambiguous: {0}")]
    Ambiguous(String),
    /// Ambiguous because at least one candidate is a weak symbol.
    #[error("ambiguous (weak symbol present): {0}")]
    AmbiguousWeak(String),
    /// Ambiguous because at least one candidate is a static (local) symbol.
    #[error("ambiguous (static symbol present): {0}")]
    AmbiguousStatic(String),
    /// Ambiguous because at least one candidate carries a GCC clone suffix
    /// (e.g. `foo.cold`).
    #[error("ambiguous (symbol suffix present): {0}")]
    AmbiguousSuffix(String),
}

impl Error {
    pub fn setup(msg: impl fmt::Display) -> Self {
        Error::Setup(msg.to_string())
    }
    pub fn format(msg: impl fmt::Display) -> Self {
        Error::Format(msg.to_string())
    }
    pub fn not_found(msg: impl fmt::Display) -> Self {
        Error::NotFound(msg.to_string())
    }
    pub fn ambiguous(msg: impl fmt::Display) -> Self {
        Error::Ambiguous(msg.to_string())
    }

    /// Whether this is one of the "ambiguous" subkinds.
    pub fn is_ambiguous(&self) -> bool {
        matches!(
            self,
            Error::Ambiguous(_)
                | Error::AmbiguousWeak(_)
                | Error::AmbiguousStatic(_)
                | Error::AmbiguousSuffix(_)
        )
    }

    /// The stable numeric discriminant, mirrored from
    /// `original_source/src/dbg/error.hpp`'s `errc` enum.
    pub fn code(&self) -> u32 {
        match self {
            Error::Setup(_) => 1,
            Error::Format(_) => 2,
            Error::NotFound(_) => 3,
            Error::Ambiguous(_) => 4,
            Error::AmbiguousWeak(_) => 5,
            Error::AmbiguousStatic(_) => 6,
            Error::AmbiguousSuffix(_) => 7,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Setup(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
