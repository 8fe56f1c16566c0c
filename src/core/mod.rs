//! 核心模块
//!
//! 包含桥接的核心基础设施：
//! - `error` - 错误类型定义
//! - `scheduler` - 异步函数的任务调度
//! - `macros` - 通用宏

pub mod error;
pub mod scheduler;
#[macro_use]
pub mod macros;

// 重新导出错误类型
pub use error::{BridgeError, BridgeResult, CodecError, CodecResult};
pub use scheduler::TaskScheduler;
