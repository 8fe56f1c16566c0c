//! Function registry
//!
//! Maps exposed names to native functions and routes decoded requests to
//! them. Synchronous functions run inline on the calling thread, asynchronous
//! ones on the scheduler's blocking pool. The map lock is never held while a
//! function runs.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::function::ExposedFunction;
use super::promise::ResolutionHandle;
use crate::bindings::protocol::{CallRequest, CallResponse};
use crate::config::script::is_identifier;
use crate::config::DuplicatePolicy;
use crate::core::error::{BridgeError, BridgeResult};
use crate::core::scheduler::TaskScheduler;

/// Outcome of routing one request
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// A synchronous function produced its response
    Resolved(CallResponse),
    /// An asynchronous function was handed to the scheduler
    Scheduled { task_id: u64 },
}

/// 函数注册表
#[derive(Debug)]
pub struct FunctionRegistry {
    functions: RwLock<HashMap<String, ExposedFunction>>,
    policy: DuplicatePolicy,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new(DuplicatePolicy::Replace)
    }
}

impl FunctionRegistry {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self {
            functions: RwLock::new(HashMap::new()),
            policy,
        }
    }

    /// 注册函数
    ///
    /// Returns the function previously registered under `name`, if the
    /// duplicate policy allowed replacing it.
    pub fn register(
        &self,
        name: &str,
        function: ExposedFunction,
    ) -> BridgeResult<Option<ExposedFunction>> {
        if !is_identifier(name) {
            return Err(BridgeError::InvalidFunctionName(name.to_string()));
        }

        let mut functions = self.write();
        if self.policy == DuplicatePolicy::Reject && functions.contains_key(name) {
            return Err(BridgeError::DuplicateFunction(name.to_string()));
        }

        let previous = functions.insert(name.to_string(), function);
        if previous.is_some() {
            tracing::debug!(target: "bridge::registry", name, "Exposed function replaced");
        } else {
            tracing::debug!(target: "bridge::registry", name, "Function exposed");
        }
        Ok(previous)
    }

    /// 注销函数
    pub fn unregister(&self, name: &str) -> Option<ExposedFunction> {
        self.write().remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Exposed names in sorted order
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn lookup(&self, name: &str) -> Option<ExposedFunction> {
        self.read().get(name).cloned()
    }

    /// 分发调用请求
    ///
    /// `make_handle` is only invoked for asynchronous functions. A failure
    /// inside a scheduled task is reported through the handle, never
    /// returned from here.
    pub fn dispatch<H>(
        &self,
        request: CallRequest,
        scheduler: &TaskScheduler,
        make_handle: H,
    ) -> BridgeResult<Dispatch>
    where
        H: FnOnce(u32) -> ResolutionHandle,
    {
        let CallRequest {
            seq,
            function: name,
            params,
        } = request;

        let function = self
            .lookup(&name)
            .ok_or_else(|| BridgeError::UnknownFunction(name.clone()))?;

        match function {
            ExposedFunction::Sync(function) => {
                let result = function(params.as_slice())?;
                Ok(Dispatch::Resolved(CallResponse::resolved(seq, result)))
            }
            ExposedFunction::Async(function) => {
                let handle = make_handle(seq);
                let task_id = scheduler.spawn_blocking(move || {
                    if let Err(error) = function(handle.clone(), params.as_slice()) {
                        handle.fail(&error);
                    }
                });
                tracing::trace!(target: "bridge::registry", seq, name = %name, task_id, "Asynchronous call scheduled");
                Ok(Dispatch::Scheduled { task_id })
            }
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ExposedFunction>> {
        self.functions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ExposedFunction>> {
        self.functions.write().unwrap_or_else(PoisonError::into_inner)
    }
}
