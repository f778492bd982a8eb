//! Glue Metrics - conversion counters for the marshaling layer
//!
//! Counters vanish in builds without the `metrics` feature: the stub types
//! below keep the same API and do nothing.
//!
//! # Feature Flags
//!
//! - `metrics` - Enable counter collection (default: disabled)
//!
//! # Usage
//!
//! ```ignore
//! use glue_metrics::Counter;
//!
//! let counter = Counter::new();
//! counter.increment("to_native", 1);
//! println!("conversions: {}", counter.get("to_native"));
//! ```

#[cfg(feature = "metrics")]
mod counter;

#[cfg(feature = "metrics")]
pub use counter::Counter;

/// Whether counters are compiled in.
pub const ENABLED: bool = cfg!(feature = "metrics");

// ============================================================================
// Macros for conditional compilation
// ============================================================================

/// Execute code only when metrics are enabled
#[macro_export]
macro_rules! metrics {
    ($($tt:tt)*) => {
        #[cfg(feature = "metrics")]
        {
            $($tt)*
        }
    };
}

// ============================================================================
// No-op stubs when metrics disabled
// ============================================================================

#[cfg(not(feature = "metrics"))]
#[derive(Default)]
pub struct Counter;

#[cfg(not(feature = "metrics"))]
impl Counter {
    pub fn new() -> Self { Self }
    pub fn increment(&self, _name: &'static str, _value: u64) {}
    pub fn get(&self, _name: &str) -> u64 { 0 }
    pub fn reset(&self, _name: &'static str) {}
    pub fn reset_all(&self) {}
    pub fn snapshot(&self) -> Vec<(&'static str, u64)> { Vec::new() }
}
