//! Recursive conversion of composite values
//!
//! Supported shapes in both directions: arrays, plain objects, strings,
//! booleans, numbers, dates and null. Anything else is refused with
//! [`ConvertError::UnsupportedShape`] rather than approximated.

use std::collections::HashSet;

use rquickjs::object::Property;
use rquickjs::{Array, IntoJs, Object, Value};

use crate::bridge::{class_id, Bridge};
use crate::error::ConvertError;
use crate::native::{self, GraphNode, NativeGraph, NativeMap, NativeValue, NodeId};

// ============================================================================
// Script -> native
// ============================================================================

pub(crate) fn to_native<'js>(bridge: &Bridge<'js>, value: &Value<'js>) -> Result<NativeValue, ConvertError> {
    let mut ancestors = Vec::new();
    native_from(bridge, value, &mut ancestors)
}

fn native_from<'js>(
    bridge: &Bridge<'js>,
    value: &Value<'js>,
    ancestors: &mut Vec<Value<'js>>,
) -> Result<NativeValue, ConvertError> {
    if value.is_undefined() || value.is_null() {
        return Ok(NativeValue::Null);
    }
    if let Some(b) = value.as_bool() {
        return Ok(NativeValue::Boolean(b));
    }
    if let Some(n) = value.as_number() {
        return Ok(NativeValue::Number(n));
    }
    if value.is_string() {
        return Ok(NativeValue::String(bridge.to_native_string(value)?));
    }
    let Some(object) = value.as_object() else {
        // symbol, bigint
        return Err(unsupported(bridge, value.type_name()));
    };

    // Shapes are decided by engine class, never by anything a script can
    // override. Proxies are refused before any trap could run.
    let classes = bridge.classes();
    let class = class_id(value);
    if class == classes.proxy {
        return Err(unsupported(bridge, "Proxy"));
    }
    if value.is_function() {
        return Err(unsupported(bridge, "function"));
    }

    if class == classes.array {
        let length = array_length(bridge, object)?;
        enter(bridge, value, ancestors)?;
        let mut items = Vec::with_capacity(length.min(PREALLOCATE_LIMIT));
        for index in 0..length {
            let item: Value = object.get(index as u32)?;
            items.push(native_from(bridge, &item, ancestors)?);
        }
        ancestors.pop();
        Ok(NativeValue::Sequence(items))
    } else if class == classes.date {
        Ok(NativeValue::Date(bridge.date_millis(object)?))
    } else if class == classes.object {
        enter(bridge, value, ancestors)?;
        let mut map = NativeMap::new();
        for prop in object.props::<String, Value>() {
            let (key, item) = prop?;
            map.insert(key, native_from(bridge, &item, ancestors)?);
        }
        ancestors.pop();
        Ok(NativeValue::Mapping(map))
    } else {
        let name = bridge.class_name(object).unwrap_or_else(|_| String::from("object"));
        Err(unsupported(bridge, &name))
    }
}

const PREALLOCATE_LIMIT: usize = 1024;

/// Validated `length` of a script array.
fn array_length<'js>(bridge: &Bridge<'js>, array: &Object<'js>) -> Result<usize, ConvertError> {
    let raw: Value = array.get("length")?;
    let length = match raw.as_number() {
        Some(n) if n.is_finite() && n >= 0.0 && n.fract() == 0.0 && n <= f64::from(u32::MAX) => n as u64,
        _ => return Err(unsupported(bridge, "array length")),
    };
    match usize::try_from(length) {
        Ok(len) if len <= bridge.max_length() => Ok(len),
        _ => Err(ConvertError::LengthExceeded {
            length,
            limit: bridge.max_length(),
        }),
    }
}

/// Push a container onto the ancestor stack, refusing cycles and runaway
/// nesting.
fn enter<'js>(bridge: &Bridge<'js>, value: &Value<'js>, ancestors: &mut Vec<Value<'js>>) -> Result<(), ConvertError> {
    if ancestors.len() >= bridge.max_depth() {
        return Err(ConvertError::DepthExceeded(bridge.max_depth()));
    }
    if ancestors.iter().any(|ancestor| ancestor == value) {
        return Err(ConvertError::CyclicEngineGraph);
    }
    ancestors.push(value.clone());
    Ok(())
}

fn unsupported(bridge: &Bridge<'_>, shape: &str) -> ConvertError {
    tracing::debug!(shape, "refusing to convert value");
    bridge.count("unsupported_shape");
    ConvertError::UnsupportedShape(shape.to_owned())
}

// ============================================================================
// Native -> script
// ============================================================================

pub(crate) fn to_engine<'js>(bridge: &Bridge<'js>, value: &NativeValue) -> Result<Value<'js>, ConvertError> {
    engine_from(bridge, value, 0)
}

fn engine_from<'js>(bridge: &Bridge<'js>, value: &NativeValue, depth: usize) -> Result<Value<'js>, ConvertError> {
    let ctx = bridge.ctx();
    match value {
        NativeValue::Null => Ok(Value::new_null(ctx.clone())),
        NativeValue::Boolean(b) => Ok(Value::new_bool(ctx.clone(), *b)),
        NativeValue::Number(n) => Ok(bridge.to_engine_number(*n)),
        NativeValue::String(s) => bridge.to_engine_string(s),
        NativeValue::Date(ms) => bridge.new_date(*ms),
        NativeValue::Sequence(items) => {
            check_depth(bridge, depth)?;
            let array = Array::new(ctx.clone())?;
            for (index, item) in items.iter().enumerate() {
                array.set(index, engine_from(bridge, item, depth + 1)?)?;
            }
            Ok(array.into_js(ctx)?)
        }
        NativeValue::Mapping(map) => {
            check_depth(bridge, depth)?;
            let object = Object::new(ctx.clone())?;
            for (key, item) in map.iter() {
                define(&object, key, engine_from(bridge, item, depth + 1)?)?;
            }
            Ok(object.into_js(ctx)?)
        }
    }
}

pub(crate) fn graph_to_engine<'js>(
    bridge: &Bridge<'js>,
    graph: &NativeGraph,
    root: NodeId,
) -> Result<Value<'js>, ConvertError> {
    let mut path = HashSet::new();
    node_to_engine(bridge, graph, root, &mut path)
}

fn node_to_engine<'js>(
    bridge: &Bridge<'js>,
    graph: &NativeGraph,
    id: NodeId,
    path: &mut HashSet<NodeId>,
) -> Result<Value<'js>, ConvertError> {
    let ctx = bridge.ctx();
    let node = graph
        .node(id)
        .ok_or_else(|| ConvertError::UnsupportedShape(format!("dangling node {}", id.index())))?;
    match node {
        GraphNode::Null => Ok(Value::new_null(ctx.clone())),
        GraphNode::Boolean(b) => Ok(Value::new_bool(ctx.clone(), *b)),
        GraphNode::Number(n) => Ok(bridge.to_engine_number(*n)),
        GraphNode::String(s) => bridge.to_engine_string(s),
        GraphNode::Date(ms) => bridge.new_date(*ms),
        GraphNode::Sequence(children) => {
            check_depth(bridge, path.len())?;
            native::enter(path, id)?;
            let array = Array::new(ctx.clone())?;
            for (index, child) in children.iter().enumerate() {
                array.set(index, node_to_engine(bridge, graph, *child, path)?)?;
            }
            path.remove(&id);
            Ok(array.into_js(ctx)?)
        }
        GraphNode::Mapping(children) => {
            check_depth(bridge, path.len())?;
            native::enter(path, id)?;
            let object = Object::new(ctx.clone())?;
            for (key, child) in children {
                define(&object, key.as_str(), node_to_engine(bridge, graph, *child, path)?)?;
            }
            path.remove(&id);
            Ok(object.into_js(ctx)?)
        }
    }
}

/// Create an own data property the way `JSON.parse` does. A plain `set`
/// would run setters, `__proto__` included.
fn define<'js>(object: &Object<'js>, key: &str, value: Value<'js>) -> rquickjs::Result<()> {
    object.prop(key, Property::from(value).writable().enumerable().configurable())
}

fn check_depth(bridge: &Bridge<'_>, depth: usize) -> Result<(), ConvertError> {
    if depth >= bridge.max_depth() {
        Err(ConvertError::DepthExceeded(bridge.max_depth()))
    } else {
        Ok(())
    }
}
