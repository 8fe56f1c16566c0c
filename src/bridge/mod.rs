//! Bridge controller
//!
//! [`Bridge`] ties the codec, registry, tracker and stub generator to one
//! hosted script context. It follows the context's lifecycle:
//!
//! ```text
//!            on_context_created()
//!   Idle ──────────────────────────▶ Ready
//!    ▲    bootstrap, injections,       │
//!    │    queued script text           │
//!    └─────────────────────────────────┘
//!            on_context_lost()
//! ```
//!
//! While `Idle`, script text is queued in request order. The bridge never
//! touches the host itself; everything it wants executed is posted to the
//! [`ContextQueue`], which the script thread drains.

pub mod function;
pub mod promise;
pub mod registry;
pub mod tracker;

pub use function::{AsyncCallable, ExposedFunction, SyncCallable};
pub use promise::ResolutionHandle;
pub use registry::{Dispatch, FunctionRegistry};
pub use tracker::{OutboundCall, OutboundCallTracker, ScriptCall, Settlement};

use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use crate::bindings::protocol::{CallRequest, CallResponse, Codec, InboundMessage};
use crate::config::script::is_property_path;
use crate::config::BridgeConfig;
use crate::core::error::{BridgeError, BridgeResult};
use crate::core::scheduler::TaskScheduler;
use crate::scripting::stub::ScriptStubs;
use crate::scripting::thread_safe::{
    context_channel, ContextQueue, ContextSender, ScriptHost, WorkItem,
};

/// 控制器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// No usable script context; script text is queued
    Idle,
    /// Context bootstrapped; script text is executed in order
    Ready,
}

struct ControllerCore {
    state: ControllerState,
    /// Bumped whenever a context appears or goes away. Settlements carry the
    /// value current when their call arrived and are dropped on mismatch.
    generation: u64,
    queued: Vec<String>,
    /// Replayed into every new context, in registration order
    injections: Vec<String>,
}

pub(crate) struct BridgeInner {
    config: BridgeConfig,
    stubs: ScriptStubs,
    registry: FunctionRegistry,
    tracker: Arc<OutboundCallTracker>,
    core: Mutex<ControllerCore>,
    context: ContextSender,
    queue: ContextQueue,
    scheduler: TaskScheduler,
}

impl BridgeInner {
    fn lock_core(&self) -> MutexGuard<'_, ControllerCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn execute(&self, code: String) {
        let mut core = self.lock_core();
        let state = core.state;
        match state {
            ControllerState::Idle => core.queued.push(code),
            ControllerState::Ready => self.context.send(WorkItem::Execute(code)),
        }
    }

    fn generation(&self) -> u64 {
        self.lock_core().generation
    }

    /// Send settlement text to the context the call came from, if it still
    /// exists. Script-side sequence numbers restart with every context.
    fn settle(&self, generation: u64, seq: u32, code: String) {
        let core = self.lock_core();
        if core.state == ControllerState::Ready && core.generation == generation {
            self.context.send(WorkItem::Execute(code));
        } else {
            tracing::debug!(target: "bridge", seq, "Settlement for a replaced context dropped");
        }
    }

    fn inject(&self, code: String) {
        let mut core = self.lock_core();
        self.push_injection(&mut core, code);
    }

    /// Inject `code` unless an identical injection is already registered
    fn inject_once(&self, code: String) -> bool {
        let mut core = self.lock_core();
        if core.injections.contains(&code) {
            return false;
        }
        self.push_injection(&mut core, code);
        true
    }

    fn push_injection(&self, core: &mut ControllerCore, code: String) {
        if core.state == ControllerState::Ready {
            self.context.send(WorkItem::Execute(code.clone()));
        }
        core.injections.push(code);
    }

    fn dispatch(self: &Arc<Self>, request: CallRequest) {
        let seq = request.seq;
        let generation = self.generation();
        let bridge = Arc::downgrade(self);
        let dispatched = self.registry.dispatch(request, &self.scheduler, |seq| {
            ResolutionHandle::new(seq, generation, bridge)
        });

        match dispatched {
            Ok(Dispatch::Resolved(response)) => self.emit_response(generation, &response),
            Ok(Dispatch::Scheduled { .. }) => {}
            Err(error) => self.report_failure(generation, seq, &error),
        }
    }

    pub(crate) fn emit_response(&self, generation: u64, response: &CallResponse) {
        self.settle(generation, response.seq, self.stubs.resolution(response));
    }

    pub(crate) fn emit_rejection(&self, generation: u64, seq: u32, message: &str) {
        self.settle(generation, seq, self.stubs.rejection(seq, message));
    }

    /// Log a failed script-to-native call. The script side only hears about
    /// it when explicit rejections are enabled.
    pub(crate) fn report_failure(&self, generation: u64, seq: u32, error: &BridgeError) {
        match error {
            BridgeError::Serialization(_) => {
                tracing::error!(target: "bridge", seq, %error, "Call failed")
            }
            _ => tracing::warn!(target: "bridge", seq, %error, "Call failed"),
        }
        if self.config.dispatch.reject_unknown_functions {
            self.emit_rejection(generation, seq, &error.to_string());
        }
    }
}

/// 原生-脚本桥接器
///
/// Cheap to clone; all clones drive the same context.
///
/// # 示例
///
/// ```ignore
/// let bridge = Bridge::with_defaults()?;
/// bridge.expose_sync("add", |a: i64, b: i64| a + b)?;
///
/// // host side
/// bridge.on_context_created();
/// bridge.pump(&mut host);
/// bridge.on_inbound_message(r#"{"seq":1,"function":"add","params":[2,3]}"#);
/// ```
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("state", &self.state())
            .field("functions", &self.inner.registry.names())
            .field("pending_calls", &self.pending_calls())
            .finish()
    }
}

/// Non-owning reference to a [`Bridge`], for functions that call back into
/// the bridge that exposes them
#[derive(Clone, Debug)]
pub struct WeakBridge {
    inner: Weak<BridgeInner>,
}

impl WeakBridge {
    pub fn upgrade(&self) -> Option<Bridge> {
        self.inner.upgrade().map(|inner| Bridge { inner })
    }
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> BridgeResult<Self> {
        config.validate()?;

        let scheduler = TaskScheduler::new(config.dispatch.worker_threads)?;
        let (context, queue) = context_channel();
        let inner = BridgeInner {
            stubs: ScriptStubs::new(&config.script),
            registry: FunctionRegistry::new(config.dispatch.duplicate_policy),
            tracker: Arc::new(OutboundCallTracker::new()),
            core: Mutex::new(ControllerCore {
                state: ControllerState::Idle,
                generation: 0,
                queued: Vec::new(),
                injections: Vec::new(),
            }),
            context,
            queue,
            scheduler,
            config,
        };

        tracing::info!(
            target: "bridge",
            workers = inner.scheduler.worker_count(),
            "Bridge initialized"
        );
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn with_defaults() -> BridgeResult<Self> {
        Self::new(BridgeConfig::default())
    }

    pub fn downgrade(&self) -> WeakBridge {
        WeakBridge {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    /// The receiving end the script thread drains
    pub fn context_queue(&self) -> &ContextQueue {
        &self.inner.queue
    }

    /// Run up to `dispatch.pump_batch` queued items against `host`. Must be
    /// called on the script thread.
    pub fn pump(&self, host: &mut dyn ScriptHost) -> usize {
        self.inner
            .queue
            .pump_limited(host, self.inner.config.dispatch.pump_batch)
    }

    pub fn state(&self) -> ControllerState {
        self.inner.lock_core().state
    }

    /// A fresh script context exists (first load or after navigation).
    ///
    /// Bootstraps it, replays every injection, then flushes script text
    /// queued while idle.
    pub fn on_context_created(&self) {
        let mut core = self.inner.lock_core();
        let context = &self.inner.context;

        context.send(WorkItem::Execute(self.inner.stubs.bootstrap()));
        for code in &core.injections {
            context.send(WorkItem::Execute(code.clone()));
        }
        let replayed = core.queued.len();
        for code in core.queued.drain(..) {
            context.send(WorkItem::Execute(code));
        }
        core.state = ControllerState::Ready;
        core.generation += 1;

        tracing::info!(
            target: "bridge",
            injections = core.injections.len(),
            replayed,
            "Script context ready"
        );
    }

    /// The current script context is going away; queue until the next one
    pub fn on_context_lost(&self) {
        let mut core = self.inner.lock_core();
        if core.state == ControllerState::Ready {
            tracing::debug!(target: "bridge", "Script context lost");
        }
        core.state = ControllerState::Idle;
        core.generation += 1;
    }

    /// Execute script text in the current context, or once one is ready
    pub fn execute(&self, code: impl Into<String>) {
        self.inner.execute(code.into());
    }

    /// Execute `code` in every future context, and now if one is ready
    pub fn inject(&self, code: impl Into<String>) {
        self.inner.inject(code.into());
    }

    /// Run native work on the script thread with access to the host
    pub fn run_on_script_thread<F>(&self, task: F)
    where
        F: FnOnce(&mut dyn ScriptHost) + Send + 'static,
    {
        self.inner.context.send(WorkItem::Task(Box::new(task)));
    }

    /// 暴露原生函数
    ///
    /// Registers `function` and makes `name` callable from the script side.
    /// Returns the generated stub source.
    pub fn expose(&self, name: &str, function: ExposedFunction) -> BridgeResult<String> {
        let kind = if function.is_async() { "async" } else { "sync" };
        self.inner.registry.register(name, function)?;

        let stub = self.inner.stubs.function_stub(name);
        let injected = self.inner.inject_once(stub.clone());

        tracing::debug!(target: "bridge", name, kind, injected, "Function available to scripts");
        Ok(stub)
    }

    pub fn expose_sync<Args, F>(&self, name: &str, function: F) -> BridgeResult<String>
    where
        Args: 'static,
        F: SyncCallable<Args>,
    {
        self.expose(name, ExposedFunction::sync(function))
    }

    pub fn expose_async<Args, F>(&self, name: &str, function: F) -> BridgeResult<String>
    where
        Args: 'static,
        F: AsyncCallable<Args>,
    {
        self.expose(name, ExposedFunction::asynchronous(function))
    }

    /// Withdraw an exposed function from this and future contexts
    pub fn unexpose(&self, name: &str) -> bool {
        if self.inner.registry.unregister(name).is_none() {
            return false;
        }

        let stub = self.inner.stubs.function_stub(name);
        self.inner.lock_core().injections.retain(|code| *code != stub);
        self.inner.execute(self.inner.stubs.remove_stub(name));
        true
    }

    /// Names currently callable from the script side, sorted
    pub fn exposed_functions(&self) -> Vec<String> {
        self.inner.registry.names()
    }

    /// Stub source for an exposed function
    pub fn stub_for(&self, name: &str) -> Option<String> {
        self.inner
            .registry
            .contains(name)
            .then(|| self.inner.stubs.function_stub(name))
    }

    /// 调用脚本函数
    ///
    /// Executes `call.function()(args...)` in the script context and returns
    /// a handle to its eventual result. The pending slot exists before the
    /// call text is queued, so a fast response cannot be lost.
    pub fn call<T: DeserializeOwned>(&self, call: ScriptCall) -> BridgeResult<OutboundCall<T>> {
        if !is_property_path(call.function()) {
            return Err(BridgeError::InvalidFunctionName(call.function().to_string()));
        }

        let tracker = &self.inner.tracker;
        let seq = tracker.allocate()?;
        let receiver = tracker.register(seq);
        self.inner
            .execute(self.inner.stubs.outbound_call(seq, call.function(), call.arguments()));

        if let Some(millis) = self.inner.config.dispatch.call_timeout_ms {
            let tracker = Arc::downgrade(tracker);
            self.inner.scheduler.spawn_background(async move {
                tokio::time::sleep(Duration::from_millis(millis)).await;
                let expired = tracker
                    .upgrade()
                    .is_some_and(|tracker| tracker.expire(seq, millis));
                if expired {
                    tracing::warn!(target: "bridge", seq, millis, "Outbound call timed out");
                }
            });
        }

        tracing::trace!(target: "bridge", seq, function = call.function(), "Outbound call sent");
        Ok(OutboundCall::new(
            seq,
            receiver,
            tracker.clone(),
            self.inner.scheduler.handle().clone(),
        ))
    }

    /// Outbound calls still waiting for the script side
    pub fn pending_calls(&self) -> usize {
        self.inner.tracker.pending_count()
    }

    /// Run `callback` every time the last pending outbound call settles
    pub fn when_all_ready<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.tracker.set_on_drained(callback);
    }

    /// Entry point for every text message the hosted context sends.
    ///
    /// Malformed messages and responses for unknown calls are logged and
    /// dropped. Synchronous functions run on the calling thread.
    pub fn on_inbound_message(&self, text: &str) {
        let message = match Codec::decode_inbound(text) {
            Ok(message) => message,
            Err(error) => {
                tracing::debug!(target: "bridge", %error, "Dropping malformed message");
                return;
            }
        };

        match message {
            InboundMessage::Response(response) => {
                let seq = response.seq;
                if !self.inner.tracker.on_response(response) {
                    tracing::debug!(target: "bridge", seq, "Response for unknown call dropped");
                }
            }
            InboundMessage::Request(request) => self.inner.dispatch(request),
        }
    }
}
