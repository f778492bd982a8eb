//! Glue Convert
//!
//! Value marshaling between QuickJS scripts and native Rust code.
//!
//! ## Architecture
//!
//! - **classify:** tells immediates (numbers, booleans, null, undefined)
//!   from heap values before anything dereferences a handle
//! - **scalar:** strings and numbers, including the fail-soft numeric read
//!   used on hot drawing paths
//! - **guard:** keeps script values alive while native code holds them
//! - **buffer:** zero-copy `(pointer, length)` views into array buffers
//! - **graph:** recursive conversion of arrays, objects and dates
//!
//! [`Bridge`] bundles all of it for one context; [`ScriptRuntime`] owns an
//! engine together with the state that outlives single callbacks.
//!
//! ```ignore
//! let runtime = ScriptRuntime::new()?;
//! let value = runtime.eval_native("({ a: 1, b: [2, 3] })")?;
//! ```

pub mod bridge;
pub mod buffer;
pub mod classify;
pub mod config;
pub mod error;
pub mod graph;
pub mod guard;
pub mod native;
pub mod runtime;
pub mod scalar;

pub use bridge::{Bridge, BridgeFactory};
pub use buffer::BufferView;
pub use classify::{Classifier, ClassifyStrategy, ValueClass};
pub use config::{BridgeSettings, RuntimeSettings, Settings};
pub use error::{ConfigError, ConvertError, ScriptError};
pub use guard::{ProtectTable, ReferenceGuard};
pub use native::{GraphNode, NativeGraph, NativeMap, NativeValue, NodeId};
pub use runtime::ScriptRuntime;

pub use rquickjs;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
