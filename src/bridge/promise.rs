//! Deferred resolution of script-side promises

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use super::function::encode_result;
use super::BridgeInner;
use crate::bindings::protocol::CallResponse;
use crate::core::error::{BridgeError, BridgeResult};

/// Settles exactly one pending script-side call.
///
/// Handed to asynchronous exposed functions. It can be cloned, moved to any
/// thread and resolved from there; every clone shares the same settled flag,
/// so only the first settlement has an effect. A handle that is dropped
/// unsettled leaves the script promise pending.
#[derive(Clone)]
pub struct ResolutionHandle {
    seq: u32,
    generation: u64,
    bridge: Weak<BridgeInner>,
    settled: Arc<AtomicBool>,
}

impl fmt::Debug for ResolutionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionHandle")
            .field("seq", &self.seq)
            .field("settled", &self.is_settled())
            .finish()
    }
}

impl ResolutionHandle {
    pub(crate) fn new(seq: u32, generation: u64, bridge: Weak<BridgeInner>) -> Self {
        Self {
            seq,
            generation,
            bridge,
            settled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Sequence number of the call this handle settles
    pub fn seq(&self) -> u32 {
        self.seq
    }

    /// Resolve the script promise with `value`.
    ///
    /// The value is encoded before the handle is consumed, so an encoding
    /// failure leaves it unsettled and can be followed by another attempt.
    pub fn resolve<T: Serialize + ?Sized>(&self, value: &T) -> BridgeResult<()> {
        let value = encode_result(value).map_err(|error| {
            tracing::error!(target: "bridge", seq = self.seq, %error, "Cannot encode resolution value");
            error
        })?;
        let bridge = self.claim()?;
        bridge.emit_response(self.generation, &CallResponse::resolved(self.seq, value));
        Ok(())
    }

    /// Resolve with `Some(value)`, or discard on `None`
    pub fn resolve_optional<T: Serialize>(&self, value: Option<T>) -> BridgeResult<()> {
        match value {
            Some(value) => self.resolve(&value),
            None => self.discard(),
        }
    }

    /// Settle without a value; the script promise resolves to `undefined`
    pub fn discard(&self) -> BridgeResult<()> {
        let bridge = self.claim()?;
        bridge.emit_response(self.generation, &CallResponse::discarded(self.seq));
        Ok(())
    }

    /// Reject the script promise with an `Error` carrying `message`
    pub fn reject(&self, message: impl AsRef<str>) -> BridgeResult<()> {
        let bridge = self.claim()?;
        bridge.emit_rejection(self.generation, self.seq, message.as_ref());
        Ok(())
    }

    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::Acquire)
    }

    /// Report a failure that happened before the function body ran
    pub(crate) fn fail(&self, error: &BridgeError) {
        match self.claim() {
            Ok(bridge) => bridge.report_failure(self.generation, self.seq, error),
            Err(_) => {
                tracing::warn!(target: "bridge", seq = self.seq, %error, "Asynchronous call failed")
            }
        }
    }

    fn claim(&self) -> BridgeResult<Arc<BridgeInner>> {
        let bridge = self.bridge.upgrade().ok_or(BridgeError::Closed)?;
        if self.settled.swap(true, Ordering::AcqRel) {
            return Err(BridgeError::AlreadyResolved(self.seq));
        }
        Ok(bridge)
    }
}

impl Drop for ResolutionHandle {
    fn drop(&mut self) {
        if Arc::strong_count(&self.settled) == 1 && !self.is_settled() {
            tracing::debug!(target: "bridge", seq = self.seq, "Resolution handle dropped unsettled");
        }
    }
}
