//! QuickJS host adapter using rquickjs
//!
//! A minimal stand-in for a web-view style surface: one script context with
//! a `window` global, a `window.external.invoke(text)` message primitive and
//! console output routed to `tracing`. Navigation replaces the context.
//!
//! The host is not `Send`; it lives on the script thread, which drives it
//! with [`QuickJsHost::run_until_idle`] or [`QuickJsHost::run_until`].

use rquickjs::{CatchResultExt, Context, Function, Runtime};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::bridge::Bridge;
use crate::core::error::{BridgeError, BridgeResult};
use crate::scripting::thread_safe::ScriptHost;

const PRELUDE: &str = r#"
globalThis.window = globalThis;
window.external = {
    invoke: (message) => __host_post(String(message))
};
globalThis.console = {
    log: (...args) => __host_log("info", args.map(String).join(" ")),
    warn: (...args) => __host_log("warn", args.map(String).join(" ")),
    error: (...args) => __host_log("error", args.map(String).join(" "))
};
"#;

type Outbox = Arc<Mutex<VecDeque<String>>>;

/// Embedded QuickJS context acting as the bridge's script side
pub struct QuickJsHost {
    runtime: Runtime,
    context: Context,
    outbox: Outbox,
}

impl QuickJsHost {
    pub fn new() -> BridgeResult<Self> {
        let runtime = Runtime::new().map_err(script_error)?;
        let outbox = Outbox::default();
        let context = fresh_context(&runtime, &outbox)?;
        Ok(Self {
            runtime,
            context,
            outbox,
        })
    }

    /// Announce the initial context to `bridge`
    pub fn attach(&mut self, bridge: &Bridge) {
        bridge.on_context_created();
    }

    /// Replace the script context, as a page navigation would. Script state
    /// and undelivered messages of the old context are lost.
    pub fn navigate(&mut self, bridge: &Bridge) -> BridgeResult<()> {
        bridge.on_context_lost();
        self.context = fresh_context(&self.runtime, &self.outbox)?;
        self.lock_outbox().clear();
        tracing::debug!(target: "scripting", "Script context replaced");
        bridge.on_context_created();
        Ok(())
    }

    /// Evaluate `code` and run the resulting promise jobs
    pub fn eval(&mut self, code: &str) -> BridgeResult<()> {
        self.context.with(|ctx| {
            ctx.eval::<(), _>(code)
                .catch(&ctx)
                .map_err(|e| BridgeError::Script(e.to_string()))
        })?;
        self.run_jobs();
        Ok(())
    }

    /// Evaluate `expression` and return its JSON value, `None` for
    /// `undefined`. The expression is trusted script text.
    pub fn eval_json(&mut self, expression: &str) -> BridgeResult<Option<Value>> {
        let code = format!("JSON.stringify({expression})");
        let text = self.context.with(|ctx| {
            ctx.eval::<Option<String>, _>(code)
                .catch(&ctx)
                .map_err(|e| BridgeError::Script(e.to_string()))
        })?;
        text.map(|text| serde_json::from_str(&text))
            .transpose()
            .map_err(|e| BridgeError::Script(e.to_string()))
    }

    /// Messages posted through `window.external.invoke` since the last call
    pub fn take_messages(&self) -> Vec<String> {
        self.lock_outbox().drain(..).collect()
    }

    /// Hand every posted message to `bridge`
    pub fn deliver(&self, bridge: &Bridge) -> usize {
        let messages = self.take_messages();
        for message in &messages {
            bridge.on_inbound_message(message);
        }
        messages.len()
    }

    /// Alternate between executing bridge work and delivering messages until
    /// neither side has anything left
    pub fn run_until_idle(&mut self, bridge: &Bridge) -> usize {
        let mut total = 0;
        loop {
            let executed = bridge.pump(self);
            let delivered = self.deliver(bridge);
            if executed == 0 && delivered == 0 {
                return total;
            }
            total += executed + delivered;
        }
    }

    /// Keep servicing `bridge` until `done` holds or `timeout` passes.
    /// Returns whether `done` was reached.
    pub fn run_until<F>(&mut self, bridge: &Bridge, timeout: Duration, mut done: F) -> bool
    where
        F: FnMut(&mut Self) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            self.run_until_idle(bridge);
            if done(self) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let slice = (deadline - now).min(Duration::from_millis(10));
            bridge.context_queue().pump_timeout(self, slice);
        }
    }

    fn run_jobs(&mut self) {
        while self.runtime.is_job_pending() {
            if self.runtime.execute_pending_job().is_err() {
                tracing::warn!(target: "scripting", "Promise job raised an exception");
            }
        }
    }

    fn lock_outbox(&self) -> std::sync::MutexGuard<'_, VecDeque<String>> {
        self.outbox.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ScriptHost for QuickJsHost {
    fn execute_in_context(&mut self, code: &str) {
        if let Err(error) = self.eval(code) {
            tracing::warn!(target: "scripting", %error, "Script execution failed");
        }
    }
}

fn fresh_context(runtime: &Runtime, outbox: &Outbox) -> BridgeResult<Context> {
    let context = Context::full(runtime).map_err(script_error)?;
    let outbox = outbox.clone();

    context
        .with(|ctx| {
            let globals = ctx.globals();
            globals.set(
                "__host_post",
                Function::new(ctx.clone(), move |message: String| {
                    outbox
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push_back(message);
                })?,
            )?;
            globals.set(
                "__host_log",
                Function::new(ctx.clone(), |level: String, line: String| {
                    match level.as_str() {
                        "error" => tracing::error!(target: "script", "{line}"),
                        "warn" => tracing::warn!(target: "script", "{line}"),
                        _ => tracing::info!(target: "script", "{line}"),
                    }
                })?,
            )?;
            ctx.eval::<(), _>(PRELUDE)
        })
        .map_err(script_error)?;

    Ok(context)
}

fn script_error(error: rquickjs::Error) -> BridgeError {
    BridgeError::Script(error.to_string())
}
