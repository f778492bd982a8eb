//! Immediate-value classification
//!
//! QuickJS stores numbers, booleans, `null` and `undefined` inline in the
//! value handle. Everything else carries a reference-counted heap pointer.
//! Native code must know which one it holds before it touches the pointer
//! half of a handle.
//!
//! Two strategies exist:
//! - **Engine API:** asks the engine for the value type. Always correct.
//! - **Tag bits:** reads the raw tag word and tests its sign bit. Requires the
//!   `fast-private-api` feature and a 64-bit target, and is only kept after a
//!   startup self-test agrees with the engine API.

use rquickjs::{Ctx, Type, Value};
use serde::{Deserialize, Serialize};

/// Sign bit of the QuickJS tag word. Reference-counted tags are negative.
pub const HEAP_TAG_MASK: u64 = 1 << 63;

/// QuickJS tag of an inline 32-bit integer.
pub const TAG_INT: i64 = 0;

/// QuickJS tag of an inline double.
pub const TAG_FLOAT64: i64 = 7;

/// Whether a raw QuickJS tag denotes a heap-allocated value.
#[inline]
pub const fn is_heap_tag(tag: i64) -> bool {
    (tag as u64) & HEAP_TAG_MASK != 0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueClass {
    Immediate,
    HeapObject,
}

/// How the classifier tells immediates from heap values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClassifyStrategy {
    #[default]
    EngineApi,
    TagBits,
}

/// Immediate-value classifier with a strategy fixed at initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classifier {
    strategy: ClassifyStrategy,
}

impl Classifier {
    pub const fn engine_api() -> Self {
        Self {
            strategy: ClassifyStrategy::EngineApi,
        }
    }

    /// Whether the tag-bit reader was compiled in.
    pub const fn tag_bits_available() -> bool {
        raw::AVAILABLE
    }

    /// Pick a classifier for `ctx`.
    ///
    /// A `TagBits` request is honoured only if the reader is compiled in and
    /// its self-test agrees with the engine on a set of known values.
    pub fn select(ctx: &Ctx<'_>, requested: ClassifyStrategy) -> Self {
        match requested {
            ClassifyStrategy::EngineApi => Self::engine_api(),
            ClassifyStrategy::TagBits if !raw::AVAILABLE => {
                tracing::warn!("tag-bit reader not compiled in, using engine API");
                Self::engine_api()
            }
            ClassifyStrategy::TagBits => match self_test(ctx) {
                Ok(true) => {
                    tracing::debug!("tag-bit reader enabled");
                    Self {
                        strategy: ClassifyStrategy::TagBits,
                    }
                }
                Ok(false) => {
                    tracing::warn!("tag-bit reader disagrees with engine layout, using engine API");
                    Self::engine_api()
                }
                Err(err) => {
                    tracing::warn!(error = %err, "tag-bit self-test failed, using engine API");
                    Self::engine_api()
                }
            },
        }
    }

    pub fn strategy(&self) -> ClassifyStrategy {
        self.strategy
    }

    pub fn classify(&self, value: &Value<'_>) -> ValueClass {
        if self.is_immediate(value) {
            ValueClass::Immediate
        } else {
            ValueClass::HeapObject
        }
    }

    #[inline]
    pub fn is_immediate(&self, value: &Value<'_>) -> bool {
        match self.strategy {
            ClassifyStrategy::EngineApi => engine_is_immediate(value),
            ClassifyStrategy::TagBits => raw::is_immediate(value),
        }
    }

    /// Numeric payload of `value`, or `0.0` for anything that is not a number.
    #[inline]
    pub(crate) fn number_or_zero(&self, value: &Value<'_>) -> f64 {
        match self.strategy {
            ClassifyStrategy::EngineApi => value.as_number().unwrap_or(0.0),
            ClassifyStrategy::TagBits => raw::number(value),
        }
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::engine_api()
    }
}

fn engine_is_immediate(value: &Value<'_>) -> bool {
    matches!(
        value.type_of(),
        Type::Uninitialized | Type::Undefined | Type::Null | Type::Bool | Type::Int | Type::Float
    )
}

/// Compare both strategies on values whose layout is known.
fn self_test(ctx: &Ctx<'_>) -> rquickjs::Result<bool> {
    let samples: [(Value<'_>, f64); 8] = [
        (Value::new_undefined(ctx.clone()), 0.0),
        (Value::new_null(ctx.clone()), 0.0),
        (Value::new_bool(ctx.clone(), true), 0.0),
        (Value::new_int(ctx.clone(), -7), -7.0),
        (Value::new_float(ctx.clone(), 2.5), 2.5),
        (ctx.eval::<Value, _>("'sample'")?, 0.0),
        (ctx.eval::<Value, _>("({})")?, 0.0),
        (ctx.eval::<Value, _>("[1, 2]")?, 0.0),
    ];

    Ok(samples.iter().all(|(value, number)| {
        raw::is_immediate(value) == engine_is_immediate(value) && raw::number(value) == *number
    }))
}

#[cfg(all(feature = "fast-private-api", target_pointer_width = "64"))]
mod raw {
    use rquickjs::Value;

    pub const AVAILABLE: bool = true;

    #[inline]
    pub fn is_immediate(value: &Value<'_>) -> bool {
        !super::is_heap_tag(value.as_raw().tag)
    }

    #[inline]
    pub fn number(value: &Value<'_>) -> f64 {
        let raw = value.as_raw();
        // SAFETY: each arm reads the union member that its tag selects.
        unsafe {
            match raw.tag {
                super::TAG_INT => raw.u.int32 as f64,
                super::TAG_FLOAT64 => raw.u.float64,
                _ => 0.0,
            }
        }
    }
}

// Without the feature, or on narrow targets, route everything through the
// engine accessor. `Classifier::select` never picks `TagBits` here.
#[cfg(not(all(feature = "fast-private-api", target_pointer_width = "64")))]
mod raw {
    use rquickjs::Value;

    pub const AVAILABLE: bool = false;

    pub fn is_immediate(value: &Value<'_>) -> bool {
        super::engine_is_immediate(value)
    }

    pub fn number(value: &Value<'_>) -> f64 {
        value.as_number().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rquickjs::{Context, Runtime};

    #[test]
    fn test_heap_tags_are_negative() {
        // QuickJS: OBJECT = -1, STRING = -7, SYMBOL = -8
        assert!(is_heap_tag(-1));
        assert!(is_heap_tag(-7));
        assert!(is_heap_tag(-8));
        // INT, BOOL, NULL, UNDEFINED, FLOAT64
        for tag in [TAG_INT, 1, 2, 3, TAG_FLOAT64] {
            assert!(!is_heap_tag(tag), "tag {tag} should be immediate");
        }
    }

    #[test]
    fn test_engine_api_classification() {
        let rt = Runtime::new().unwrap();
        let context = Context::full(&rt).unwrap();
        context.with(|ctx| {
            let classifier = Classifier::engine_api();
            for src in ["undefined", "null", "true", "42", "3.5", "NaN"] {
                let value: Value = ctx.eval(src).unwrap();
                assert_eq!(classifier.classify(&value), ValueClass::Immediate, "{src}");
            }
            for src in ["'text'", "({})", "[1]", "(function () {})", "Symbol('s')", "new Date(0)"] {
                let value: Value = ctx.eval(src).unwrap();
                assert_eq!(classifier.classify(&value), ValueClass::HeapObject, "{src}");
            }
        });
    }

    #[test]
    fn test_select_engine_api() {
        let rt = Runtime::new().unwrap();
        let context = Context::full(&rt).unwrap();
        context.with(|ctx| {
            let classifier = Classifier::select(&ctx, ClassifyStrategy::EngineApi);
            assert_eq!(classifier.strategy(), ClassifyStrategy::EngineApi);
        });
    }

    #[test]
    fn test_tag_bits_request_degrades_when_unavailable() {
        let rt = Runtime::new().unwrap();
        let context = Context::full(&rt).unwrap();
        context.with(|ctx| {
            let classifier = Classifier::select(&ctx, ClassifyStrategy::TagBits);
            if Classifier::tag_bits_available() {
                assert_eq!(classifier.strategy(), ClassifyStrategy::TagBits);
            } else {
                assert_eq!(classifier.strategy(), ClassifyStrategy::EngineApi);
            }
        });
    }

    #[cfg(all(feature = "fast-private-api", target_pointer_width = "64"))]
    #[test]
    fn test_tag_bits_agree_with_engine() {
        let rt = Runtime::new().unwrap();
        let context = Context::full(&rt).unwrap();
        context.with(|ctx| {
            let fast = Classifier::select(&ctx, ClassifyStrategy::TagBits);
            let safe = Classifier::engine_api();
            for src in ["undefined", "null", "false", "-3", "1e300", "'s'", "[]", "({a: 1})"] {
                let value: Value = ctx.eval(src).unwrap();
                assert_eq!(fast.classify(&value), safe.classify(&value), "{src}");
                assert_eq!(fast.number_or_zero(&value), safe.number_or_zero(&value), "{src}");
            }
        });
    }
}
