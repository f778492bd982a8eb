//! Error types for the marshaling layer

use rquickjs::{Ctx, Exception};
use thiserror::Error;

/// Failure of a conversion across the script/native boundary.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The value has a shape the object-graph bridge does not convert
    /// (function, symbol, typed array, `Map`, ...).
    #[error("unsupported value shape: {0}")]
    UnsupportedShape(String),

    #[error("value is not an ArrayBuffer or typed array")]
    NotABuffer,

    #[error("native graph contains a cycle")]
    CyclicNativeGraph,

    #[error("script object graph contains a cycle")]
    CyclicEngineGraph,

    #[error("value nesting exceeds the limit of {0} levels")]
    DepthExceeded(usize),

    #[error("array length {length} exceeds the limit of {limit} elements")]
    LengthExceeded { length: u64, limit: usize },

    #[error("script engine error: {0}")]
    Engine(#[from] rquickjs::Error),
}

impl ConvertError {
    /// Raise this failure inside the script as a `TypeError`.
    ///
    /// Engine errors are passed through so a pending exception is kept.
    pub fn throw(self, ctx: &Ctx<'_>) -> rquickjs::Error {
        match self {
            ConvertError::Engine(err) => err,
            other => Exception::throw_type(ctx, &other.to_string()),
        }
    }
}

/// Errors from loading settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid settings: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors from the script runtime wrapper.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error(transparent)]
    Engine(#[from] rquickjs::Error),

    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to read script: {0}")]
    Io(#[from] std::io::Error),
}
