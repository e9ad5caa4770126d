use std::fmt;

/// Failure inside a persistence medium
#[derive(Debug)]
pub enum MediumError {
    /// File read/write/rename failure.
    Io(std::io::Error),
    /// SQLite statement failure.
    #[cfg(feature = "sqlite")]
    Sqlite(rusqlite::Error),
}

impl fmt::Display for MediumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "IO error: {e}"),
            #[cfg(feature = "sqlite")]
            Self::Sqlite(e) => write!(f, "sqlite error: {e}"),
        }
    }
}

impl std::error::Error for MediumError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            #[cfg(feature = "sqlite")]
            Self::Sqlite(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for MediumError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for MediumError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Sqlite(e)
    }
}

#[derive(Debug)]
pub enum PrefsError {
    /// The persistence medium failed.
    Medium(MediumError),
    /// Stored or imported JSON did not decode.
    Parse(serde_json::Error),
    /// Stored or imported JSON is not an object.
    NotAnObject,
    /// Imported record lacks a required top-level field.
    MissingField(&'static str),
    /// A write was requested without an identity.
    NoIdentity,
}

impl fmt::Display for PrefsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Medium(e) => write!(f, "storage: {e}"),
            Self::Parse(e) => write!(f, "invalid preferences JSON: {e}"),
            Self::NotAnObject => write!(f, "preferences JSON must be an object"),
            Self::MissingField(field) => write!(f, "preferences JSON is missing '{field}'"),
            Self::NoIdentity => write!(f, "no user identity"),
        }
    }
}

impl std::error::Error for PrefsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Medium(e) => Some(e),
            Self::Parse(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MediumError> for PrefsError {
    fn from(e: MediumError) -> Self {
        Self::Medium(e)
    }
}

impl From<serde_json::Error> for PrefsError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e)
    }
}
