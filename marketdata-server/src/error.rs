use std::{error::Error as StdError, fmt};

/// Error type for the server binary.
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub enum Error {
    /// Configuration file is missing.
    ConfigFile,
    /// Failed to parse configuration file.
    ConfigFormat(toml::de::Error),
    /// Failed to read or write to a file.
    Io(std::io::Error),
    /// Failed to bind or serve the listen address.
    Serve(std::io::Error),
    /// Error returned by the marketdata crate.
    Core(marketdata::Error),
}

impl StdError for Error {
    #[inline]
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::ConfigFile => None,
            Self::ConfigFormat(err) => Some(err),
            Self::Io(err) | Self::Serve(err) => Some(err),
            Self::Core(err) => Some(err),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::ConfigFile => write!(f, "Configuration file is missing"),
            Self::ConfigFormat(err) => err.fmt(f),
            Self::Io(err) => err.fmt(f),
            Self::Serve(err) => write!(f, "Failed to serve the API: {err}"),
            Self::Core(err) => err.fmt(f),
        }
    }
}

impl From<std::io::Error> for Error {
    #[inline]
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<marketdata::Error> for Error {
    #[inline]
    fn from(err: marketdata::Error) -> Self {
        Self::Core(err)
    }
}

impl From<toml::de::Error> for Error {
    #[inline]
    fn from(err: toml::de::Error) -> Self {
        Self::ConfigFormat(err)
    }
}
