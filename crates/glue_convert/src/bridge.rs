//! Conversion facade for one engine context
//!
//! A [`Bridge`] is cheap to build at the top of a native callback. It
//! resolves the engine intrinsics the conversions need once, then exposes
//! every conversion as a method.

use std::rc::Rc;

use glue_metrics::Counter;
use rquickjs::function::{Constructor, This};
use rquickjs::{qjs, Ctx, Function, Object, Value};

use crate::buffer::{self, BufferView};
use crate::classify::{Classifier, ValueClass};
use crate::config::BridgeSettings;
use crate::error::ConvertError;
use crate::graph;
use crate::guard::ReferenceGuard;
use crate::native::{NativeGraph, NativeValue, NodeId};
use crate::scalar;

/// Built-ins looked up from the global object when the bridge is created.
struct Intrinsics<'js> {
    object_to_string: Function<'js>,
    date: Constructor<'js>,
    date_get_time: Function<'js>,
}

impl<'js> Intrinsics<'js> {
    fn resolve(ctx: &Ctx<'js>) -> rquickjs::Result<Self> {
        let globals = ctx.globals();
        let object_proto: Object = globals.get::<_, Object>("Object")?.get("prototype")?;
        let date: Constructor = globals.get("Date")?;
        let date_proto: Object = date.get("prototype")?;
        Ok(Self {
            object_to_string: object_proto.get("toString")?,
            date_get_time: date_proto.get("getTime")?,
            date,
        })
    }
}

/// Engine class ids of the built-ins the object-graph bridge tells apart.
///
/// Read from live instances once per runtime. Unlike
/// `Object.prototype.toString`, a class id cannot be spoofed from script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ClassIds {
    pub(crate) object: qjs::JSClassID,
    pub(crate) array: qjs::JSClassID,
    pub(crate) date: qjs::JSClassID,
    pub(crate) proxy: qjs::JSClassID,
    pub(crate) array_buffer: qjs::JSClassID,
    /// `0` when the engine was built without `SharedArrayBuffer`.
    pub(crate) shared_array_buffer: qjs::JSClassID,
}

impl ClassIds {
    fn resolve(ctx: &Ctx<'_>) -> rquickjs::Result<Self> {
        let id = |src: &str| -> rquickjs::Result<qjs::JSClassID> {
            let value: Value = ctx.eval(src)?;
            Ok(class_id(&value))
        };
        Ok(Self {
            object: id("({})")?,
            array: id("[]")?,
            date: id("new Date(0)")?,
            proxy: id("new Proxy({}, {})")?,
            array_buffer: id("new ArrayBuffer(0)")?,
            shared_array_buffer: id("typeof SharedArrayBuffer === 'function' ? new SharedArrayBuffer(0) : null")?,
        })
    }

    pub(crate) fn is_array_buffer(&self, class: qjs::JSClassID) -> bool {
        class != 0 && (class == self.array_buffer || class == self.shared_array_buffer)
    }
}

/// Engine class id of `value`, `0` for non-objects.
pub(crate) fn class_id(value: &Value<'_>) -> qjs::JSClassID {
    // SAFETY: only reads the class id of a live object; the handle is borrowed.
    unsafe { qjs::JS_GetClassID(value.as_raw()) }
}

/// Script/native conversions bound to one context.
pub struct Bridge<'js> {
    ctx: Ctx<'js>,
    classifier: Classifier,
    max_depth: usize,
    max_length: usize,
    classes: ClassIds,
    stats: Rc<Counter>,
    intrinsics: Intrinsics<'js>,
}

/// Everything needed to build a [`Bridge`], detached from any context.
///
/// Native bindings capture a factory and build a bridge per call; all of
/// them share one classifier choice and one set of counters.
#[derive(Clone)]
pub struct BridgeFactory {
    classifier: Classifier,
    max_depth: usize,
    max_length: usize,
    classes: ClassIds,
    stats: Rc<Counter>,
}

impl BridgeFactory {
    /// Factory for bridges over `ctx` and every other context of its runtime.
    pub fn new(ctx: &Ctx<'_>, classifier: Classifier, settings: &BridgeSettings) -> Result<Self, ConvertError> {
        Ok(Self {
            classifier,
            max_depth: settings.max_depth,
            max_length: settings.max_length,
            classes: ClassIds::resolve(ctx)?,
            stats: Rc::new(Counter::new()),
        })
    }

    pub fn classifier(&self) -> Classifier {
        self.classifier
    }

    pub fn stats(&self) -> &Counter {
        &self.stats
    }

    pub fn bridge<'js>(&self, ctx: &Ctx<'js>) -> Result<Bridge<'js>, ConvertError> {
        Ok(Bridge {
            ctx: ctx.clone(),
            classifier: self.classifier,
            max_depth: self.max_depth,
            max_length: self.max_length,
            classes: self.classes,
            stats: self.stats.clone(),
            intrinsics: Intrinsics::resolve(ctx)?,
        })
    }
}

impl<'js> Bridge<'js> {
    /// Bridge with its own counters. Picks the classifier from `settings`.
    pub fn new(ctx: &Ctx<'js>, settings: &BridgeSettings) -> Result<Self, ConvertError> {
        let classifier = Classifier::select(ctx, settings.strategy);
        BridgeFactory::new(ctx, classifier, settings)?.bridge(ctx)
    }

    pub fn ctx(&self) -> &Ctx<'js> {
        &self.ctx
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub(crate) fn classes(&self) -> &ClassIds {
        &self.classes
    }

    pub fn stats(&self) -> &Counter {
        &self.stats
    }

    #[inline]
    pub(crate) fn count(&self, name: &'static str) {
        self.stats.increment(name, 1);
    }

    // ------------------------------------------------------------------
    // Classifier / scalars
    // ------------------------------------------------------------------

    pub fn classify(&self, value: &Value<'js>) -> ValueClass {
        self.classifier.classify(value)
    }

    pub fn to_native_string(&self, value: &Value<'js>) -> Result<String, ConvertError> {
        scalar::to_native_string(&self.ctx, value)
    }

    pub fn to_engine_string(&self, string: &str) -> Result<Value<'js>, ConvertError> {
        scalar::to_engine_string(&self.ctx, string)
    }

    /// See [`scalar::to_number_fast`].
    #[inline]
    pub fn to_number_fast(&self, value: &Value<'js>) -> f64 {
        scalar::to_number_fast(&self.classifier, value)
    }

    pub fn to_engine_number(&self, number: f64) -> Value<'js> {
        scalar::to_engine_number(&self.ctx, number)
    }

    // ------------------------------------------------------------------
    // Buffers / lifetime
    // ------------------------------------------------------------------

    pub fn get_buffer_view<'v>(&self, value: &'v Value<'js>) -> Result<BufferView<'v>, ConvertError> {
        let view = buffer::get_buffer_view(&self.ctx, &self.classes, value);
        self.count(if view.is_ok() { "buffer_view" } else { "not_a_buffer" });
        view
    }

    pub fn protect(&self, value: &Value<'js>) -> ReferenceGuard {
        self.count("protect");
        ReferenceGuard::protect(&self.ctx, &self.classifier, value)
    }

    // ------------------------------------------------------------------
    // Object graphs
    // ------------------------------------------------------------------

    pub fn to_native(&self, value: &Value<'js>) -> Result<NativeValue, ConvertError> {
        self.count("to_native");
        graph::to_native(self, value)
    }

    pub fn to_engine(&self, value: &NativeValue) -> Result<Value<'js>, ConvertError> {
        self.count("to_engine");
        graph::to_engine(self, value)
    }

    pub fn graph_to_engine(&self, graph: &NativeGraph, root: NodeId) -> Result<Value<'js>, ConvertError> {
        self.count("to_engine");
        graph::graph_to_engine(self, graph, root)
    }

    // ------------------------------------------------------------------
    // Intrinsic helpers
    // ------------------------------------------------------------------

    /// Display name of `object`'s class: `"Map"`, `"Uint8Array"`, ...
    ///
    /// Honours `Symbol.toStringTag`, so only fit for messages.
    pub(crate) fn class_name(&self, object: &Object<'js>) -> Result<String, ConvertError> {
        let tag: String = self
            .intrinsics
            .object_to_string
            .call((This(object.clone()),))?;
        Ok(tag
            .strip_prefix("[object ")
            .and_then(|rest| rest.strip_suffix(']'))
            .unwrap_or(tag.as_str())
            .to_owned())
    }

    /// Milliseconds since the epoch of a `Date`. Throws for anything else.
    pub(crate) fn date_millis(&self, object: &Object<'js>) -> Result<f64, ConvertError> {
        Ok(self.intrinsics.date_get_time.call((This(object.clone()),))?)
    }

    pub(crate) fn new_date(&self, millis: f64) -> Result<Value<'js>, ConvertError> {
        Ok(self.intrinsics.date.construct((millis,))?)
    }
}
