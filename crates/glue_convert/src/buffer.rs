//! Zero-copy views into script-owned binary buffers
//!
//! Pixel and vertex data arrive from scripts as typed arrays. Copying them on
//! every draw call is too slow, so native code reads them in place through a
//! [`BufferView`].

use std::marker::PhantomData;

use rquickjs::{ArrayBuffer, Ctx, Function, Object, Value};

use crate::bridge::{class_id, ClassIds};
use crate::error::ConvertError;

/// Raw `(pointer, length)` view into engine-managed memory.
///
/// The view borrows the value handle it was taken from, so the buffer
/// cannot be freed while the view exists. It still aliases memory the
/// script can write to, detach or resize whenever script code runs. Pin
/// the owning value with a [`ReferenceGuard`](crate::guard::ReferenceGuard)
/// and extract a fresh view if the bytes are needed past the current call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferView<'a> {
    ptr: *const u8,
    len: usize,
    source: PhantomData<&'a [u8]>,
}

impl<'a> BufferView<'a> {
    pub const fn empty() -> Self {
        Self {
            ptr: std::ptr::null(),
            len: 0,
            source: PhantomData,
        }
    }

    fn of(bytes: &[u8]) -> Self {
        Self {
            ptr: bytes.as_ptr(),
            len: bytes.len(),
            source: PhantomData,
        }
    }

    /// Sub-view of `length` bytes starting at `offset`, `None` if out of
    /// bounds.
    fn window(&self, offset: usize, length: usize) -> Option<Self> {
        let end = offset.checked_add(length)?;
        if end > self.len {
            return None;
        }
        if length == 0 {
            return Some(Self::empty());
        }
        Some(Self {
            // SAFETY: offset + length is within the viewed allocation.
            ptr: unsafe { self.ptr.add(offset) },
            len: length,
            source: PhantomData,
        })
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Borrow the viewed bytes.
    ///
    /// # Safety
    ///
    /// No script code may run while the slice is in use: scripts can write
    /// to the buffer, detach it or resize it.
    pub unsafe fn as_slice(&self) -> &'a [u8] {
        if self.len == 0 {
            &[]
        } else {
            std::slice::from_raw_parts(self.ptr, self.len)
        }
    }
}

/// View the bytes behind an `ArrayBuffer` or typed array.
///
/// Typed arrays are viewed over their own window (`byteOffset`,
/// `byteLength`), not the whole backing buffer. Anything else, including
/// `DataView`, fails with [`ConvertError::NotABuffer`]. A detached buffer
/// yields an empty view.
pub(crate) fn get_buffer_view<'v, 'js>(
    ctx: &Ctx<'js>,
    classes: &ClassIds,
    value: &'v Value<'js>,
) -> Result<BufferView<'v>, ConvertError> {
    let Some(object) = value.as_object() else {
        return Err(ConvertError::NotABuffer);
    };

    if classes.is_array_buffer(class_id(value)) {
        return Ok(backing_view(ctx, object).unwrap_or(BufferView::empty()));
    }

    if !is_typed_array(ctx, value)? {
        return Err(ConvertError::NotABuffer);
    }

    let backing: Object = object.get("buffer")?;
    if !classes.is_array_buffer(class_id(&backing)) {
        return Err(ConvertError::NotABuffer);
    }
    let Some(whole) = backing_view(ctx, &backing) else {
        return Ok(BufferView::empty());
    };
    let offset = byte_count(object.get("byteOffset")?)?;
    let length = byte_count(object.get("byteLength")?)?;

    // Accessors can be shadowed from script; never trust them past the
    // backing store.
    let window = whole.window(offset, length).ok_or(ConvertError::NotABuffer)?;
    tracing::trace!(offset, length, "typed array view");
    Ok(window)
}

/// View over an object already known to be an array buffer, `None` once
/// detached.
fn backing_view<'v, 'js>(ctx: &Ctx<'js>, object: &Object<'js>) -> Option<BufferView<'v>> {
    match ArrayBuffer::from_object(object.clone()) {
        Some(buffer) => buffer.as_bytes().map(BufferView::of),
        None => {
            // The engine raised "detached" on the read; nothing else will catch it.
            ctx.catch();
            None
        }
    }
}

/// `ArrayBuffer.isView(value)`, excluding `DataView`.
fn is_typed_array<'js>(ctx: &Ctx<'js>, value: &Value<'js>) -> Result<bool, ConvertError> {
    let array_buffer: Object = ctx.globals().get("ArrayBuffer")?;
    let is_view: Function = array_buffer.get("isView")?;
    if !is_view.call::<_, bool>((value.clone(),))? {
        return Ok(false);
    }
    // Only typed arrays carry an element size.
    let object = value.as_object().ok_or(ConvertError::NotABuffer)?;
    let element_size: Value = object.get("BYTES_PER_ELEMENT")?;
    Ok(element_size.is_number())
}

fn byte_count(raw: f64) -> Result<usize, ConvertError> {
    if raw.is_finite() && raw >= 0.0 && raw.fract() == 0.0 {
        Ok(raw as usize)
    } else {
        Err(ConvertError::NotABuffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::Bridge;
    use crate::config::BridgeSettings;
    use rquickjs::{Context, Runtime};

    fn eval<'js>(ctx: &Ctx<'js>, src: &str) -> Value<'js> {
        ctx.eval(src).unwrap()
    }

    #[test]
    fn test_sixteen_byte_typed_array() {
        let rt = Runtime::new().unwrap();
        let context = Context::full(&rt).unwrap();
        context.with(|ctx| {
            let bridge = Bridge::new(&ctx, &BridgeSettings::default()).unwrap();
            let bytes = eval(&ctx, "Uint8Array.from({ length: 16 }, (_, i) => i * 3)");
            let view = bridge.get_buffer_view(&bytes).unwrap();
            assert_eq!(view.len(), 16);
            let expected: Vec<u8> = (0..16).map(|i| i * 3).collect();
            assert_eq!(unsafe { view.as_slice() }, expected.as_slice());
        });
    }

    #[test]
    fn test_wide_elements_report_bytes() {
        let rt = Runtime::new().unwrap();
        let context = Context::full(&rt).unwrap();
        context.with(|ctx| {
            let bridge = Bridge::new(&ctx, &BridgeSettings::default()).unwrap();
            let floats = eval(&ctx, "new Float32Array([1, 2, 3, 4])");
            let view = bridge.get_buffer_view(&floats).unwrap();
            assert_eq!(view.len(), 16);
            let bytes = unsafe { view.as_slice() };
            assert_eq!(&bytes[4..8], &2.0f32.to_ne_bytes());
        });
    }

    #[test]
    fn test_array_buffer_and_subarray() {
        let rt = Runtime::new().unwrap();
        let context = Context::full(&rt).unwrap();
        context.with(|ctx| {
            let bridge = Bridge::new(&ctx, &BridgeSettings::default()).unwrap();
            ctx.eval::<(), _>(
                "globalThis.buf = new ArrayBuffer(12); new Uint8Array(buf).forEach((_, i, a) => { a[i] = i; });",
            )
            .unwrap();

            let buf = eval(&ctx, "buf");
            let whole = bridge.get_buffer_view(&buf).unwrap();
            assert_eq!(whole.len(), 12);

            let sub = eval(&ctx, "new Uint8Array(buf, 4, 6)");
            let window = bridge.get_buffer_view(&sub).unwrap();
            assert_eq!(unsafe { window.as_slice() }, &[4, 5, 6, 7, 8, 9]);
            assert_eq!(window.as_ptr(), unsafe { whole.as_ptr().add(4) });
        });
    }

    #[test]
    fn test_view_aliases_script_memory() {
        let rt = Runtime::new().unwrap();
        let context = Context::full(&rt).unwrap();
        context.with(|ctx| {
            let bridge = Bridge::new(&ctx, &BridgeSettings::default()).unwrap();
            let pixels = eval(&ctx, "globalThis.pixels = new Uint8Array(4); pixels");
            let view = bridge.get_buffer_view(&pixels).unwrap();
            ctx.eval::<(), _>("pixels[2] = 200;").unwrap();
            assert_eq!(unsafe { view.as_slice() }, &[0, 0, 200, 0]);
        });
    }

    #[test]
    fn test_non_buffers_rejected() {
        let rt = Runtime::new().unwrap();
        let context = Context::full(&rt).unwrap();
        context.with(|ctx| {
            let bridge = Bridge::new(&ctx, &BridgeSettings::default()).unwrap();
            for src in [
                "42",
                "'bytes'",
                "null",
                "[1, 2, 3]",
                "({ buffer: new ArrayBuffer(4), byteOffset: 0, byteLength: 4 })",
                "new DataView(new ArrayBuffer(8))",
            ] {
                let value = eval(&ctx, src);
                assert!(matches!(bridge.get_buffer_view(&value), Err(ConvertError::NotABuffer)), "{src}");
            }
        });
    }

    #[test]
    fn test_empty_buffer() {
        let rt = Runtime::new().unwrap();
        let context = Context::full(&rt).unwrap();
        context.with(|ctx| {
            let bridge = Bridge::new(&ctx, &BridgeSettings::default()).unwrap();
            let empty = eval(&ctx, "new Uint16Array(0)");
            let view = bridge.get_buffer_view(&empty).unwrap();
            assert!(view.is_empty());
            assert!(unsafe { view.as_slice() }.is_empty());
        });
    }

    #[test]
    fn test_detached_buffer_gives_empty_view() {
        let rt = Runtime::new().unwrap();
        let context = Context::full(&rt).unwrap();
        context.with(|ctx| {
            let bridge = Bridge::new(&ctx, &BridgeSettings::default()).unwrap();
            let buf = eval(&ctx, "globalThis.frame = new ArrayBuffer(32); frame");
            let pixels = eval(&ctx, "new Uint8Array(frame, 8, 8)");
            assert_eq!(bridge.get_buffer_view(&pixels).unwrap().len(), 8);

            let mut buffer = ArrayBuffer::from_value(buf.clone()).unwrap();
            buffer.detach();

            assert!(bridge.get_buffer_view(&buf).unwrap().is_empty());
            assert!(bridge.get_buffer_view(&pixels).unwrap().is_empty());
        });
    }
}
