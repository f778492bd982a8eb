//! Keeping script values alive from native code
//!
//! The engine only tracks references it can see. Native code holding a value
//! past the callback that produced it must register it, or the collector may
//! free it underneath.
//!
//! - [`ReferenceGuard`]: one owner, released on drop.
//! - [`ProtectTable`]: counted protect/unprotect keyed by value identity, for
//!   code that hands the same value in and out of native state repeatedly.
//!
//! Releasing is total. Immediates, values never protected and values already
//! released are skipped instead of reaching the engine.

use rquickjs::{Ctx, Persistent, Value};

use crate::bridge::Bridge;
use crate::classify::{Classifier, ValueClass};

/// Native-held token keeping one script value alive.
///
/// Immediates need no keeping alive but are held the same way, so
/// `restore` works for every value.
pub struct ReferenceGuard {
    held: Option<Persistent<Value<'static>>>,
    class: ValueClass,
}

impl ReferenceGuard {
    pub fn protect<'js>(ctx: &Ctx<'js>, classifier: &Classifier, value: &Value<'js>) -> Self {
        let class = classifier.classify(value);
        Self {
            held: Some(Persistent::save(ctx, value.clone())),
            class,
        }
    }

    pub fn class(&self) -> ValueClass {
        self.class
    }

    pub fn is_released(&self) -> bool {
        self.held.is_none()
    }

    /// Get the guarded value back inside a context of the same runtime.
    /// Returns `None` once released.
    pub fn restore<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<Option<Value<'js>>> {
        self.held
            .as_ref()
            .map(|held| held.clone().restore(ctx))
            .transpose()
    }

    /// Let the engine collect the value. Further calls do nothing.
    pub fn release(&mut self) {
        if let Some(held) = self.held.take() {
            tracing::trace!(class = ?self.class, "reference released");
            drop(held);
        }
    }
}

impl std::fmt::Debug for ReferenceGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceGuard")
            .field("class", &self.class)
            .field("released", &self.is_released())
            .finish()
    }
}

impl Drop for ReferenceGuard {
    fn drop(&mut self) {
        self.release();
    }
}

struct Entry {
    value: Persistent<Value<'static>>,
    count: usize,
}

/// Counted protect registry.
///
/// Each `protect` of a heap value adds one to its count; each `release_safe`
/// takes one away and drops the engine reference when the count reaches
/// zero. Values are matched by identity.
///
/// Tables must be dropped before the runtime that owns their values.
#[derive(Default)]
pub struct ProtectTable {
    entries: Vec<Entry>,
}

impl ProtectTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct values currently protected.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn protect<'js>(&mut self, bridge: &Bridge<'js>, value: &Value<'js>) {
        bridge.count("protect");
        if bridge.classifier().is_immediate(value) {
            return;
        }
        match self.position(bridge.ctx(), value) {
            Some(index) => self.entries[index].count += 1,
            None => self.entries.push(Entry {
                value: Persistent::save(bridge.ctx(), value.clone()),
                count: 1,
            }),
        }
    }

    /// Undo one `protect` of `value`.
    ///
    /// Never fails: immediates are not looked up, and values that are not
    /// (or no longer) protected are ignored.
    pub fn release_safe<'js>(&mut self, bridge: &Bridge<'js>, value: &Value<'js>) {
        if bridge.classifier().is_immediate(value) {
            bridge.count("release_skipped");
            return;
        }
        let Some(index) = self.position(bridge.ctx(), value) else {
            tracing::trace!("release of unprotected value ignored");
            bridge.count("release_skipped");
            return;
        };
        bridge.count("release");
        let entry = &mut self.entries[index];
        entry.count -= 1;
        if entry.count == 0 {
            self.entries.swap_remove(index);
        }
    }

    /// Protect count of `value`, `0` for immediates and unknown values.
    pub fn protect_count<'js>(&self, bridge: &Bridge<'js>, value: &Value<'js>) -> usize {
        if bridge.classifier().is_immediate(value) {
            return 0;
        }
        self.position(bridge.ctx(), value)
            .map_or(0, |index| self.entries[index].count)
    }

    pub fn is_protected<'js>(&self, bridge: &Bridge<'js>, value: &Value<'js>) -> bool {
        self.protect_count(bridge, value) > 0
    }

    /// Drop every protection at once.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn position<'js>(&self, ctx: &Ctx<'js>, value: &Value<'js>) -> Option<usize> {
        self.entries.iter().position(|entry| {
            entry
                .value
                .clone()
                .restore(ctx)
                .map_or(false, |held| held == *value)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeSettings;
    use rquickjs::{Context, Object, Runtime};

    #[test]
    fn test_guard_keeps_value_across_callbacks() {
        let rt = Runtime::new().unwrap();
        let context = Context::full(&rt).unwrap();

        let mut guard = context.with(|ctx| {
            let value: Value = ctx.eval("({ name: 'texture' })").unwrap();
            ReferenceGuard::protect(&ctx, &Classifier::engine_api(), &value)
        });
        assert_eq!(guard.class(), ValueClass::HeapObject);

        rt.run_gc();

        context.with(|ctx| {
            let value = guard.restore(&ctx).unwrap().expect("guard still held");
            let object: Object = value.into_object().unwrap();
            assert_eq!(object.get::<_, String>("name").unwrap(), "texture");
        });

        guard.release();
        guard.release();
        assert!(guard.is_released());
        context.with(|ctx| assert!(guard.restore(&ctx).unwrap().is_none()));
    }

    #[test]
    fn test_guard_on_immediate() {
        let rt = Runtime::new().unwrap();
        let context = Context::full(&rt).unwrap();
        context.with(|ctx| {
            let mut guard = ReferenceGuard::protect(&ctx, &Classifier::engine_api(), &Value::new_null(ctx.clone()));
            assert_eq!(guard.class(), ValueClass::Immediate);
            assert!(guard.restore(&ctx).unwrap().unwrap().is_null());
            guard.release();
        });
    }

    #[test]
    fn test_table_counts_protections() {
        let rt = Runtime::new().unwrap();
        let context = Context::full(&rt).unwrap();
        context.with(|ctx| {
            let bridge = Bridge::new(&ctx, &BridgeSettings::default()).unwrap();
            let mut table = ProtectTable::new();
            let a: Value = ctx.eval("globalThis.a = {}; a").unwrap();
            let b: Value = ctx.eval("[]").unwrap();

            table.protect(&bridge, &a);
            table.protect(&bridge, &a);
            table.protect(&bridge, &b);
            assert_eq!(table.len(), 2);
            assert_eq!(table.protect_count(&bridge, &a), 2);

            let a_again: Value = ctx.eval("a").unwrap();
            table.release_safe(&bridge, &a_again);
            assert!(table.is_protected(&bridge, &a));
            table.release_safe(&bridge, &a);
            assert!(!table.is_protected(&bridge, &a));

            // Already fully released: ignored.
            table.release_safe(&bridge, &a);
            assert_eq!(table.len(), 1);

            table.clear();
            assert!(table.is_empty());
        });
    }

    #[test]
    fn test_release_safe_on_immediates_and_strangers() {
        let rt = Runtime::new().unwrap();
        let context = Context::full(&rt).unwrap();
        context.with(|ctx| {
            let bridge = Bridge::new(&ctx, &BridgeSettings::default()).unwrap();
            let mut table = ProtectTable::new();
            for src in ["null", "undefined", "0", "-1.5", "true", "({})", "'never protected'"] {
                let value: Value = ctx.eval(src).unwrap();
                table.release_safe(&bridge, &value);
            }
            table.protect(&bridge, &Value::new_int(ctx.clone(), 3));
            assert!(table.is_empty());
        });
    }
}
