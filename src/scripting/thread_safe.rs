//! Script-thread hand-off
//!
//! The hosted script engine is single-threaded: everything that touches it
//! must run on the one thread that owns it. Other threads never call into
//! the host directly; they push owned [`WorkItem`]s onto a channel which the
//! script thread drains with [`ContextQueue::pump`].

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::fmt;
use std::time::Duration;

/// The capability the bridge needs from the hosting surface
pub trait ScriptHost {
    /// Run `code` as a script statement in the current context
    fn execute_in_context(&mut self, code: &str);
}

/// 脚本线程任务
type ScriptTask = Box<dyn FnOnce(&mut dyn ScriptHost) + Send + 'static>;

/// 脚本命令
pub enum WorkItem {
    /// 执行脚本
    Execute(String),
    /// Arbitrary native work that must run on the script thread
    Task(ScriptTask),
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Execute(code) => f.debug_tuple("Execute").field(code).finish(),
            Self::Task(_) => f.debug_tuple("Task").field(&"<function>").finish(),
        }
    }
}

impl WorkItem {
    fn run(self, host: &mut dyn ScriptHost) {
        match self {
            Self::Execute(code) => host.execute_in_context(&code),
            Self::Task(task) => task(host),
        }
    }
}

/// Producer side, shared by every thread that needs script work done
#[derive(Debug, Clone)]
pub struct ContextSender {
    sender: Sender<WorkItem>,
}

impl ContextSender {
    pub fn send(&self, item: WorkItem) {
        if self.sender.send(item).is_err() {
            tracing::warn!(target: "scripting", "Script context queue closed, work item dropped");
        }
    }
}

/// Consumer side, drained by the script thread
#[derive(Debug, Clone)]
pub struct ContextQueue {
    receiver: Receiver<WorkItem>,
}

/// Create a connected sender/queue pair
pub fn context_channel() -> (ContextSender, ContextQueue) {
    let (sender, receiver) = unbounded();
    (ContextSender { sender }, ContextQueue { receiver })
}

impl ContextQueue {
    /// 处理所有待执行的任务，直到队列为空
    pub fn pump(&self, host: &mut dyn ScriptHost) -> usize {
        let mut processed = 0;
        while let Ok(item) = self.receiver.try_recv() {
            item.run(host);
            processed += 1;
        }
        processed
    }

    /// 最多处理 `max_items` 个任务
    pub fn pump_limited(&self, host: &mut dyn ScriptHost, max_items: usize) -> usize {
        let mut processed = 0;
        while processed < max_items {
            match self.receiver.try_recv() {
                Ok(item) => {
                    item.run(host);
                    processed += 1;
                }
                Err(_) => break,
            }
        }
        processed
    }

    /// Wait up to `timeout` for work, then drain whatever is queued
    pub fn pump_timeout(&self, host: &mut dyn ScriptHost, timeout: Duration) -> usize {
        match self.receiver.recv_timeout(timeout) {
            Ok(item) => {
                item.run(host);
                1 + self.pump(host)
            }
            Err(RecvTimeoutError::Timeout) => 0,
            Err(RecvTimeoutError::Disconnected) => {
                tracing::debug!(target: "scripting", "Script context queue disconnected");
                0
            }
        }
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
