//! Scalar conversions: strings and numbers

use rquickjs::convert::Coerced;
use rquickjs::function::This;
use rquickjs::{Ctx, FromJs, Function, IntoJs, Object, String as JsString, Value};

use crate::classify::Classifier;
use crate::error::ConvertError;

/// Convert any script value to a native string using the script's own
/// `ToString` coercion. Lone surrogates become U+FFFD. Symbols and objects
/// whose `toString` throws fail with [`ConvertError::Engine`].
pub fn to_native_string<'js>(ctx: &Ctx<'js>, value: &Value<'js>) -> Result<String, ConvertError> {
    let string = match value.as_string() {
        Some(string) => string.clone(),
        None => Coerced::<JsString>::from_js(ctx, value.clone())?.0,
    };
    match string.to_string() {
        Err(rquickjs::Error::Utf8(_)) => well_formed(ctx, &string),
        other => Ok(other?),
    }
}

/// `String.prototype.toWellFormed` applied to `string`.
fn well_formed<'js>(ctx: &Ctx<'js>, string: &JsString<'js>) -> Result<String, ConvertError> {
    let prototype: Object = ctx.globals().get::<_, Object>("String")?.get("prototype")?;
    let to_well_formed: Function = prototype.get("toWellFormed")?;
    let fixed: JsString = to_well_formed.call((This(string.clone()),))?;
    Ok(fixed.to_string()?)
}

pub fn to_engine_string<'js>(ctx: &Ctx<'js>, string: &str) -> Result<Value<'js>, ConvertError> {
    Ok(string.into_js(ctx)?)
}

/// Engine number for `number`. Integral values are stored inline as ints,
/// except `-0.0`, which keeps its sign as a double.
pub fn to_engine_number<'js>(ctx: &Ctx<'js>, number: f64) -> Value<'js> {
    if number == 0.0 && number.is_sign_negative() {
        Value::new_float(ctx.clone(), number)
    } else {
        Value::new_number(ctx.clone(), number)
    }
}

/// Numeric value of `value`, or `0.0` for anything that is not a number.
///
/// No coercion happens: `"3"`, `true`, `undefined` and objects all read as
/// zero. Hot drawing paths depend on this never failing.
#[inline]
pub fn to_number_fast(classifier: &Classifier, value: &Value<'_>) -> f64 {
    classifier.number_or_zero(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rquickjs::{Context, Runtime};

    #[test]
    fn test_number_round_trip() {
        let rt = Runtime::new().unwrap();
        let context = Context::full(&rt).unwrap();
        context.with(|ctx| {
            let classifier = Classifier::engine_api();
            for x in [0.0, -0.0, 1.0, -1.0, 3.14, 1e-300, 1e300, f64::MAX, f64::MIN_POSITIVE, 2147483648.0] {
                let value = to_engine_number(&ctx, x);
                assert_eq!(to_number_fast(&classifier, &value).to_bits(), x.to_bits(), "{x}");
            }
        });
    }

    #[test]
    fn test_negative_zero_keeps_sign() {
        let rt = Runtime::new().unwrap();
        let context = Context::full(&rt).unwrap();
        context.with(|ctx| {
            ctx.globals().set("z", to_engine_number(&ctx, -0.0)).unwrap();
            let negative: bool = ctx.eval("Object.is(z, -0)").unwrap();
            assert!(negative);
            assert!(to_engine_number(&ctx, 0.0).is_int());
        });
    }

    #[test]
    fn test_lone_surrogates_replaced() {
        let rt = Runtime::new().unwrap();
        let context = Context::full(&rt).unwrap();
        context.with(|ctx| {
            let cases = [
                ("'a\\uD800b'", "a\u{FFFD}b"),
                ("'\\uDC00'", "\u{FFFD}"),
                ("'pair \\uD83C\\uDFA8 ok'", "pair 🎨 ok"),
                ("['x\\uDBFF']", "x\u{FFFD}"),
            ];
            for (src, expected) in cases {
                let value: Value = ctx.eval(src).unwrap();
                assert_eq!(to_native_string(&ctx, &value).unwrap(), expected, "{src}");
            }
        });
    }

    #[test]
    fn test_non_numbers_read_as_zero() {
        let rt = Runtime::new().unwrap();
        let context = Context::full(&rt).unwrap();
        context.with(|ctx| {
            let classifier = Classifier::engine_api();
            for src in ["'3'", "'abc'", "''", "true", "null", "undefined", "({valueOf() { return 5; }})", "[7]", "Symbol()"] {
                let value: Value = ctx.eval(src).unwrap();
                assert_eq!(to_number_fast(&classifier, &value), 0.0, "{src}");
            }
        });
    }

    #[test]
    fn test_string_round_trip() {
        let rt = Runtime::new().unwrap();
        let context = Context::full(&rt).unwrap();
        context.with(|ctx| {
            let long = "x".repeat(1 << 16);
            for s in ["", "plain", "ünïcødé", "日本語", "emoji 🎨 in text", "nul\0byte", long.as_str()] {
                let value = to_engine_string(&ctx, s).unwrap();
                assert!(value.is_string());
                assert_eq!(to_native_string(&ctx, &value).unwrap(), s);
            }
        });
    }

    #[test]
    fn test_native_string_coerces() {
        let rt = Runtime::new().unwrap();
        let context = Context::full(&rt).unwrap();
        context.with(|ctx| {
            let cases = [("42", "42"), ("true", "true"), ("null", "null"), ("[1, 2]", "1,2"), ("({})", "[object Object]")];
            for (src, expected) in cases {
                let value: Value = ctx.eval(src).unwrap();
                assert_eq!(to_native_string(&ctx, &value).unwrap(), expected);
            }

            let symbol: Value = ctx.eval("Symbol('s')").unwrap();
            assert!(matches!(to_native_string(&ctx, &symbol), Err(ConvertError::Engine(_))));
        });
    }
}
