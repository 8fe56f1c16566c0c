//! Native-to-script call tracking
//!
//! Each outbound call gets a sequence number and a pending slot. The slot is
//! fulfilled when the script side reports back, or cleared by a discard or an
//! expiry. Sequence numbers start at 1, increase strictly and are never
//! reused.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::bindings::protocol::{CallResponse, Codec};
use crate::core::error::{BridgeError, BridgeResult};

/// How a pending slot was cleared
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    Response(CallResponse),
    Discarded,
    Expired { millis: u64 },
}

type DrainedCallback = Arc<dyn Fn() + Send + Sync>;

/// 外发调用追踪器
pub struct OutboundCallTracker {
    next_seq: AtomicU32,
    pending: Mutex<HashMap<u32, oneshot::Sender<Settlement>>>,
    on_drained: Mutex<Option<DrainedCallback>>,
}

impl Default for OutboundCallTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl OutboundCallTracker {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    fn starting_at(seq: u32) -> Self {
        Self {
            next_seq: AtomicU32::new(seq),
            pending: Mutex::new(HashMap::new()),
            on_drained: Mutex::new(None),
        }
    }

    /// Next sequence number. Fails instead of wrapping around.
    pub fn allocate(&self) -> BridgeResult<u32> {
        self.next_seq
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |seq| seq.checked_add(1))
            .map_err(|_| BridgeError::SequenceExhausted)
    }

    /// Open the pending slot for `seq`
    pub fn register(&self, seq: u32) -> oneshot::Receiver<Settlement> {
        let (sender, receiver) = oneshot::channel();
        if self.lock_pending().insert(seq, sender).is_some() {
            tracing::warn!(target: "bridge::tracker", seq, "Pending slot replaced");
        }
        receiver
    }

    /// Fulfil the slot named by `response.seq`. Returns `false` when no call
    /// with that number is pending.
    pub fn on_response(&self, response: CallResponse) -> bool {
        let seq = response.seq;
        self.settle(seq, Settlement::Response(response))
    }

    /// Clear the slot; its call yields [`BridgeError::Discarded`]
    pub fn discard(&self, seq: u32) -> bool {
        self.settle(seq, Settlement::Discarded)
    }

    /// Clear the slot; its call yields [`BridgeError::Timeout`]
    pub fn expire(&self, seq: u32, millis: u64) -> bool {
        self.settle(seq, Settlement::Expired { millis })
    }

    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    pub fn is_pending(&self, seq: u32) -> bool {
        self.lock_pending().contains_key(&seq)
    }

    /// Run `callback` every time a settlement leaves no call pending
    pub fn set_on_drained<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self
            .on_drained
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(callback));
    }

    fn settle(&self, seq: u32, settlement: Settlement) -> bool {
        let (sender, drained) = {
            let mut pending = self.lock_pending();
            let sender = pending.remove(&seq);
            let drained = sender.is_some() && pending.is_empty();
            (sender, drained)
        };

        let Some(sender) = sender else {
            return false;
        };
        if sender.send(settlement).is_err() {
            tracing::trace!(target: "bridge::tracker", seq, "Caller stopped waiting");
        }

        if drained {
            let callback = self
                .on_drained
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some(callback) = callback {
                callback();
            }
        }
        true
    }

    fn lock_pending(&self) -> MutexGuard<'_, HashMap<u32, oneshot::Sender<Settlement>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Arguments for a native-to-script call, serialized eagerly
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptCall {
    function: String,
    arguments: Vec<Value>,
}

impl ScriptCall {
    /// `function` is a script property path such as `Math.max`
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            arguments: Vec::new(),
        }
    }

    pub fn with_args(function: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self {
            function: function.into(),
            arguments,
        }
    }

    /// Append an argument. Fails when the value has no wire representation.
    pub fn arg<T: Serialize + ?Sized>(mut self, value: &T) -> BridgeResult<Self> {
        let value =
            Codec::encode_value(value).map_err(|e| BridgeError::Serialization(e.to_string()))?;
        self.arguments.push(value);
        Ok(self)
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }
}

/// A pending native-to-script call producing a `T`.
///
/// Await it from async code, or block with [`OutboundCall::wait`] from any
/// thread other than the script thread. Blocking never needs a runtime of
/// its own, so it is also safe inside a task of another tokio runtime,
/// though it stalls that task's worker until the script side answers.
#[must_use = "an outbound call does nothing unless awaited or waited on"]
pub struct OutboundCall<T> {
    seq: u32,
    receiver: oneshot::Receiver<Settlement>,
    tracker: Arc<OutboundCallTracker>,
    runtime: Handle,
    _result: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for OutboundCall<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundCall").field("seq", &self.seq).finish()
    }
}

impl<T: DeserializeOwned> OutboundCall<T> {
    pub(crate) fn new(
        seq: u32,
        receiver: oneshot::Receiver<Settlement>,
        tracker: Arc<OutboundCallTracker>,
        runtime: Handle,
    ) -> Self {
        Self {
            seq,
            receiver,
            tracker,
            runtime,
            _result: PhantomData,
        }
    }

    pub fn seq(&self) -> u32 {
        self.seq
    }

    /// Block until the script side responds
    pub fn wait(self) -> BridgeResult<T> {
        futures::executor::block_on(self)
    }

    /// Block for at most `timeout`. On expiry the pending slot is removed and
    /// a late response is dropped.
    pub fn wait_timeout(mut self, timeout: Duration) -> BridgeResult<T> {
        let waited = {
            // the bridge runtime drives the timer
            let _runtime = self.runtime.enter();
            futures::executor::block_on(tokio::time::timeout(timeout, &mut self.receiver))
        };
        match waited {
            Ok(Ok(settlement)) => settle_into(self.seq, settlement),
            Ok(Err(_)) => Err(BridgeError::Closed),
            Err(_) => {
                let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                if !self.tracker.expire(self.seq, millis) {
                    // settled between the deadline and the expiry
                    if let Ok(settlement) = self.receiver.try_recv() {
                        return settle_into(self.seq, settlement);
                    }
                }
                Err(BridgeError::Timeout {
                    seq: self.seq,
                    millis,
                })
            }
        }
    }

    /// Stop waiting and forget the pending slot
    pub fn discard(self) -> bool {
        self.tracker.discard(self.seq)
    }
}

impl<T: DeserializeOwned> Future for OutboundCall<T> {
    type Output = BridgeResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let seq = self.seq;
        match self.receiver.poll_unpin(cx) {
            Poll::Ready(Ok(settlement)) => Poll::Ready(settle_into(seq, settlement)),
            Poll::Ready(Err(_)) => Poll::Ready(Err(BridgeError::Closed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

fn settle_into<T: DeserializeOwned>(seq: u32, settlement: Settlement) -> BridgeResult<T> {
    match settlement {
        Settlement::Response(response) if response.present => {
            Ok(Codec::decode_value(response.result)?)
        }
        Settlement::Response(_) | Settlement::Discarded => Err(BridgeError::Discarded { seq }),
        Settlement::Expired { millis } => Err(BridgeError::Timeout { seq, millis }),
    }
}
