use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Wraps an opaque external failure (a resource-fetch exception, an engine
/// exception) so it can ride inside a `Clone`-able `Error`. `anyhow::Error`
/// itself isn't `Clone`, and verdicts need to be cloneable for fan-out to
/// renderers/reporting sinks.
#[derive(Debug, Clone)]
pub struct OpaqueError(pub Arc<anyhow::Error>);

impl std::fmt::Display for OpaqueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for OpaqueError {}

#[cfg(feature = "serde")]
impl serde::Serialize for OpaqueError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(&self.0)
    }
}

#[derive(Debug, Error, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Error {
    #[error("test case has no test expression or test-file reference")]
    InvalidTestCase,
    #[error("unknown charset: {0}")]
    UnknownCharset(String),
    #[error("no resolved bytes for referenced path {0:?}")]
    MissingResolvedPath(PathBuf),
    #[error("cannot represent sequence as XML")]
    CannotRepresentAsXml,
    #[error("assertion evaluator observed AssumptionFailed, which can only be produced by earlier stages")]
    UnexpectedAssumptionFailed,
    #[error("resource fetch failed for {0:?}")]
    ResourceFetch(PathBuf, #[source] OpaqueError),
    #[error(transparent)]
    Engine(OpaqueError),
}

impl From<anyhow::Error> for Error {
    fn from(error: anyhow::Error) -> Self {
        Error::Engine(OpaqueError(Arc::new(error)))
    }
}

impl From<xot::Error> for Error {
    fn from(error: xot::Error) -> Self {
        Error::from(anyhow::Error::from(error))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
