//! 任务调度系统
//!
//! Owns the execution context that asynchronous exposed functions run on.
//!
//! ## 功能特性
//!
//! - 阻塞任务执行 (async exposed functions never run on the message-delivery thread)
//! - 后台 Future 执行
//! - 运行时句柄共享 (used by outbound calls to block with a timeout)
//!
//! Script-context work is *not* scheduled here; see
//! [`crate::scripting::thread_safe::ContextQueue`].

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::runtime::{Builder, Handle, Runtime};

use crate::core::error::BridgeResult;

/// 任务调度器
///
/// 管理异步函数的后台执行。
///
/// # 示例
///
/// ```ignore
/// let scheduler = TaskScheduler::new(4)?;
///
/// // 阻塞任务 (async exposed function bodies)
/// scheduler.spawn_blocking(|| {
///     // 可以阻塞的操作
/// });
/// ```
pub struct TaskScheduler {
    /// Tokio 运行时 (taken on drop)
    runtime: Option<Runtime>,
    /// 运行时句柄
    handle: Handle,
    /// 下一个任务 ID
    next_task_id: AtomicU64,
    /// 工作线程数
    worker_count: usize,
}

impl TaskScheduler {
    /// 创建任务调度器
    ///
    /// # 参数
    /// - `worker_threads`: 工作线程数量，0 表示使用 CPU 核心数
    pub fn new(worker_threads: usize) -> BridgeResult<Self> {
        let workers = if worker_threads == 0 {
            num_cpus::get()
        } else {
            worker_threads
        };

        let runtime = Builder::new_multi_thread()
            .worker_threads(workers)
            .thread_name("script-bridge-worker")
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();

        tracing::debug!(target: "bridge::scheduler", workers, "Task scheduler started");

        Ok(Self {
            runtime: Some(runtime),
            handle,
            next_task_id: AtomicU64::new(1),
            worker_count: workers,
        })
    }

    /// 在阻塞线程池执行任务
    ///
    /// Returns the task id, used only for log correlation.
    pub fn spawn_blocking<F>(&self, task: F) -> u64
    where
        F: FnOnce() + Send + 'static,
    {
        let task_id = self.next_task_id.fetch_add(1, Ordering::SeqCst);
        self.handle.spawn_blocking(move || {
            tracing::trace!(target: "bridge::scheduler", task_id, "Blocking task started");
            task();
            tracing::trace!(target: "bridge::scheduler", task_id, "Blocking task finished");
        });
        task_id
    }

    /// 在后台执行异步任务
    pub fn spawn_background<F>(&self, task: F) -> u64
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let task_id = self.next_task_id.fetch_add(1, Ordering::SeqCst);
        self.handle.spawn(task);
        task_id
    }

    /// 获取运行时句柄
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// 获取工作线程数
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        // The last bridge reference may be released on one of our own worker
        // threads, where a blocking shutdown would panic.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
