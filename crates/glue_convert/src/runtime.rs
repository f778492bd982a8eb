//! Script runtime management
//!
//! Owns a QuickJS runtime and context together with the conversion state
//! that outlives single callbacks: the selected classifier, the shared
//! counters and the protect table.

use std::cell::RefCell;
use std::path::Path;

use glue_metrics::Counter;
use rquickjs::{Context, Function, Runtime, Value};

use crate::bridge::{Bridge, BridgeFactory};
use crate::classify::Classifier;
use crate::config::Settings;
use crate::error::ScriptError;
use crate::guard::ProtectTable;
use crate::native::NativeValue;

/// Script execution context
pub struct ScriptRuntime {
    // Dropped first: protected values must be released while the runtime lives.
    protected: RefCell<ProtectTable>,
    factory: BridgeFactory,
    settings: Settings,
    pub context: Context,
    #[allow(dead_code)] // Kept alive for context lifetime
    runtime: Runtime,
}

impl ScriptRuntime {
    pub fn new() -> Result<Self, ScriptError> {
        Self::with_settings(Settings::default())
    }

    pub fn with_settings(settings: Settings) -> Result<Self, ScriptError> {
        let runtime = Runtime::new()?;
        if let Some(limit) = settings.runtime.memory_limit_bytes {
            runtime.set_memory_limit(limit);
        }
        if let Some(limit) = settings.runtime.max_stack_size_bytes {
            runtime.set_max_stack_size(limit);
        }
        let context = Context::full(&runtime)?;
        let factory = context.with(|ctx| {
            let classifier = Classifier::select(&ctx, settings.bridge.strategy);
            BridgeFactory::new(&ctx, classifier, &settings.bridge)
        })?;
        tracing::debug!(strategy = ?factory.classifier().strategy(), "script runtime ready");

        Ok(Self {
            protected: RefCell::new(ProtectTable::new()),
            factory,
            settings,
            context,
            runtime,
        })
    }

    pub fn classifier(&self) -> Classifier {
        self.factory.classifier()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Conversion counters shared by every bridge this runtime hands out.
    pub fn stats(&self) -> &Counter {
        self.factory.stats()
    }

    /// Factory for bridges that share this runtime's classifier and
    /// counters, for use inside native bindings.
    pub fn bridge_factory(&self) -> BridgeFactory {
        self.factory.clone()
    }

    pub fn execute_file(&self, path: &Path) -> Result<(), ScriptError> {
        let source = std::fs::read_to_string(path)?;
        self.execute(&source)
    }

    pub fn execute(&self, source: &str) -> Result<(), ScriptError> {
        self.context.with(|ctx| {
            ctx.eval::<(), _>(source)?;
            Ok(())
        })
    }

    /// Call a JavaScript function by name with no arguments.
    pub fn call_function(&self, name: &str) -> Result<(), ScriptError> {
        self.context.with(|ctx| {
            let func: Function = ctx.globals().get(name)?;
            func.call::<_, ()>(())?;
            Ok(())
        })
    }

    /// Evaluate `source` and convert its completion value.
    pub fn eval_native(&self, source: &str) -> Result<NativeValue, ScriptError> {
        self.with_bridge(|bridge| {
            let value: Value = bridge.ctx().eval(source)?;
            Ok(bridge.to_native(&value)?)
        })
    }

    /// Call a global function with native arguments and convert its result.
    pub fn call_native(&self, name: &str, args: &[NativeValue]) -> Result<NativeValue, ScriptError> {
        self.with_bridge(|bridge| {
            let func: Function = bridge.ctx().globals().get(name)?;
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(bridge.to_engine(arg)?);
            }
            let result: Value = func.call((rquickjs::function::Rest(values),))?;
            Ok(bridge.to_native(&result)?)
        })
    }

    /// Run `f` with a bridge over this runtime's context.
    pub fn with_bridge<F, R>(&self, f: F) -> Result<R, ScriptError>
    where
        F: for<'js> FnOnce(&Bridge<'js>) -> Result<R, ScriptError>,
    {
        self.context.with(|ctx| {
            let bridge = self.factory.bridge(&ctx)?;
            f(&bridge)
        })
    }

    /// Like [`with_bridge`](Self::with_bridge), with access to the runtime's
    /// protect table.
    pub fn with_guards<F, R>(&self, f: F) -> Result<R, ScriptError>
    where
        F: for<'js> FnOnce(&Bridge<'js>, &mut ProtectTable) -> Result<R, ScriptError>,
    {
        self.with_bridge(|bridge| f(bridge, &mut *self.protected.borrow_mut()))
    }
}

impl Drop for ScriptRuntime {
    fn drop(&mut self) {
        glue_metrics::metrics! {
            tracing::debug!(counters = ?self.factory.stats().snapshot(), "script runtime shutting down");
        }
        self.protected.get_mut().clear();
    }
}
