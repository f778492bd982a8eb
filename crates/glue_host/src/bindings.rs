//! Native functions exposed to scripts as the global `native` object

use glue_convert::{BridgeFactory, ConvertError};
use rquickjs::{Ctx, Function, Object, Value};

/// Install `native.*` into the global scope of `ctx`.
///
/// | binding              | returns                                   |
/// |----------------------|-------------------------------------------|
/// | `print(msg)`         | logs `msg`                                |
/// | `inspect(value)`     | JSON text of the converted value          |
/// | `kind(value)`        | native type the value converts to         |
/// | `roundTrip(value)`   | a fresh copy made through native values   |
/// | `toNumber(value)`    | number, or `0` for non-numbers            |
/// | `byteLength(buffer)` | bytes visible through the buffer view     |
/// | `checksum(buffer)`   | wrapping sum of the viewed bytes          |
pub fn install<'js>(ctx: &Ctx<'js>, factory: &BridgeFactory) -> rquickjs::Result<()> {
    let native = Object::new(ctx.clone())?;

    native.set(
        "print",
        Function::new(ctx.clone(), |message: String| {
            tracing::info!(target: "script", "{message}");
        })?,
    )?;

    let f = factory.clone();
    native.set(
        "inspect",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, value: Value<'js>| -> rquickjs::Result<String> {
            let bridge = f.bridge(&ctx).map_err(|err| err.throw(&ctx))?;
            let native = bridge.to_native(&value).map_err(|err| err.throw(&ctx))?;
            Ok(native.to_json().to_string())
        })?,
    )?;

    let f = factory.clone();
    native.set(
        "kind",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, value: Value<'js>| -> rquickjs::Result<&'static str> {
            let bridge = f.bridge(&ctx).map_err(|err| err.throw(&ctx))?;
            let native = bridge.to_native(&value).map_err(|err| err.throw(&ctx))?;
            Ok(native.type_name())
        })?,
    )?;

    let f = factory.clone();
    native.set(
        "roundTrip",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, value: Value<'js>| -> rquickjs::Result<Value<'js>> {
            let bridge = f.bridge(&ctx).map_err(|err| err.throw(&ctx))?;
            bridge
                .to_native(&value)
                .and_then(|native| bridge.to_engine(&native))
                .map_err(|err| err.throw(&ctx))
        })?,
    )?;

    let f = factory.clone();
    native.set(
        "toNumber",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, value: Value<'js>| -> rquickjs::Result<f64> {
            let bridge = f.bridge(&ctx).map_err(|err| err.throw(&ctx))?;
            Ok(bridge.to_number_fast(&value))
        })?,
    )?;

    let f = factory.clone();
    native.set(
        "byteLength",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, value: Value<'js>| -> rquickjs::Result<f64> {
            let view = view_bytes(&f, &ctx, &value, |bytes| bytes.len())?;
            Ok(view as f64)
        })?,
    )?;

    let f = factory.clone();
    native.set(
        "checksum",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, value: Value<'js>| -> rquickjs::Result<f64> {
            let sum = view_bytes(&f, &ctx, &value, |bytes| {
                bytes.iter().fold(0u32, |acc, b| acc.wrapping_add(u32::from(*b)))
            })?;
            Ok(f64::from(sum))
        })?,
    )?;

    ctx.globals().set("native", native)?;
    Ok(())
}

/// Run `read` over the bytes of a buffer argument. The view is used and
/// dropped before control returns to the script.
fn view_bytes<'js, R>(
    factory: &BridgeFactory,
    ctx: &Ctx<'js>,
    value: &Value<'js>,
    read: impl FnOnce(&[u8]) -> R,
) -> rquickjs::Result<R> {
    let bridge = factory.bridge(ctx).map_err(|err| err.throw(ctx))?;
    let view = bridge
        .get_buffer_view(value)
        .map_err(|err: ConvertError| err.throw(ctx))?;
    // SAFETY: no script code runs while the slice is alive.
    Ok(read(unsafe { view.as_slice() }))
}
