//! Exposed native functions
//!
//! A function is tagged [`ExposedFunction::Sync`] or [`ExposedFunction::Async`]
//! when it is built; nothing downstream inspects its concrete type. Typed
//! closures are adapted through [`SyncCallable`] and [`AsyncCallable`], which
//! decode parameters positionally and encode the return value.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::bindings::protocol::Codec;
use crate::bridge::promise::ResolutionHandle;
use crate::core::error::{BridgeError, BridgeResult};

pub type SyncFn = Arc<dyn Fn(&[Value]) -> BridgeResult<Value> + Send + Sync>;
pub type AsyncFn = Arc<dyn Fn(ResolutionHandle, &[Value]) -> BridgeResult<()> + Send + Sync>;

/// A native capability callable from the script side
#[derive(Clone)]
pub enum ExposedFunction {
    /// Returns its result directly; runs inline on the dispatching thread
    Sync(SyncFn),
    /// Receives a [`ResolutionHandle`] and settles it later, from any thread
    Async(AsyncFn),
}

impl fmt::Debug for ExposedFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync(_) => f.write_str("ExposedFunction::Sync(<function>)"),
            Self::Async(_) => f.write_str("ExposedFunction::Async(<function>)"),
        }
    }
}

impl ExposedFunction {
    /// Wrap a typed closure, e.g. `|a: i64, b: i64| a + b`.
    ///
    /// Missing trailing parameters (and explicit `null`s) take the type's
    /// default value. `()` and `None` results encode to `null`.
    pub fn sync<Args, F>(function: F) -> Self
    where
        Args: 'static,
        F: SyncCallable<Args>,
    {
        Self::Sync(Arc::new(move |params: &[Value]| {
            <F as SyncCallable<Args>>::call_with(&function, params)
        }))
    }

    /// Wrap a typed closure taking the resolution handle first, e.g.
    /// `|handle: ResolutionHandle, n: u32| { ... handle.resolve(&n) ... }`.
    pub fn asynchronous<Args, F>(function: F) -> Self
    where
        Args: 'static,
        F: AsyncCallable<Args>,
    {
        Self::Async(Arc::new(move |handle: ResolutionHandle, params: &[Value]| {
            <F as AsyncCallable<Args>>::call_with(&function, handle, params)
        }))
    }

    /// Untyped synchronous function working on raw wire values
    pub fn raw_sync<F>(function: F) -> Self
    where
        F: Fn(&[Value]) -> BridgeResult<Value> + Send + Sync + 'static,
    {
        Self::Sync(Arc::new(function))
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Self::Async(_))
    }
}

/// Closures usable as synchronous exposed functions (up to six parameters)
pub trait SyncCallable<Args>: Send + Sync + 'static {
    fn call_with(&self, params: &[Value]) -> BridgeResult<Value>;
}

/// Closures usable as asynchronous exposed functions (up to six parameters
/// after the handle)
pub trait AsyncCallable<Args>: Send + Sync + 'static {
    fn call_with(&self, handle: ResolutionHandle, params: &[Value]) -> BridgeResult<()>;
}

/// Decode parameter `index`; absent or `null` yields `T::default()`
pub(crate) fn decode_param<T>(params: &[Value], index: usize) -> BridgeResult<T>
where
    T: DeserializeOwned + Default,
{
    match params.get(index) {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => T::deserialize(value).map_err(|e| BridgeError::InvalidArgument {
            index,
            reason: e.to_string(),
        }),
    }
}

pub(crate) fn encode_result<R: Serialize + ?Sized>(result: &R) -> BridgeResult<Value> {
    Codec::encode_value(result).map_err(|e| BridgeError::Serialization(e.to_string()))
}

macro_rules! impl_callables {
    ($($arg:ident : $idx:tt),*) => {
        impl<Func, Ret, $($arg,)*> SyncCallable<($($arg,)*)> for Func
        where
            Func: Fn($($arg),*) -> Ret + Send + Sync + 'static,
            Ret: Serialize,
            $($arg: DeserializeOwned + Default,)*
        {
            #[allow(unused_variables)]
            fn call_with(&self, params: &[Value]) -> BridgeResult<Value> {
                let args = ($(decode_param::<$arg>(params, $idx)?,)*);
                let result = (self)($(args.$idx),*);
                encode_result(&result)
            }
        }

        impl<Func, $($arg,)*> AsyncCallable<($($arg,)*)> for Func
        where
            Func: Fn(ResolutionHandle, $($arg),*) + Send + Sync + 'static,
            $($arg: DeserializeOwned + Default,)*
        {
            #[allow(unused_variables)]
            fn call_with(&self, handle: ResolutionHandle, params: &[Value]) -> BridgeResult<()> {
                let args = ($(decode_param::<$arg>(params, $idx)?,)*);
                (self)(handle, $(args.$idx),*);
                Ok(())
            }
        }
    };
}

impl_callables!();
impl_callables!(A0: 0);
impl_callables!(A0: 0, A1: 1);
impl_callables!(A0: 0, A1: 1, A2: 2);
impl_callables!(A0: 0, A1: 1, A2: 2, A3: 3);
impl_callables!(A0: 0, A1: 1, A2: 2, A3: 3, A4: 4);
impl_callables!(A0: 0, A1: 1, A2: 2, A3: 3, A4: 4, A5: 5);
