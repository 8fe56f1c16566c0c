use super::{ConfigError, ConfigResult};
use crate::impl_default;
use serde::{Deserialize, Serialize};

/// 调度配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// 异步函数工作线程数 (0 = CPU 核心数)
    pub worker_threads: usize,

    /// Native-to-script call timeout. `None` keeps calls pending until a
    /// response arrives.
    pub call_timeout_ms: Option<u64>,

    /// Send an explicit rejection to the script side when a request names an
    /// unknown function or cannot be decoded. Changes wire behaviour.
    pub reject_unknown_functions: bool,

    /// 重名函数策略
    pub duplicate_policy: DuplicatePolicy,

    /// 每次 pump 最多执行的脚本任务数
    pub pump_batch: usize,
}

impl_default!(DispatchConfig {
    worker_threads: 0,
    call_timeout_ms: None,
    reject_unknown_functions: false,
    duplicate_policy: DuplicatePolicy::Replace,
    pump_batch: 64,
});

impl DispatchConfig {
    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.worker_threads > 512 {
            return Err(ConfigError::ValidationError(
                "Invalid worker thread count".to_string(),
            ));
        }
        if self.call_timeout_ms == Some(0) {
            return Err(ConfigError::ValidationError(
                "Call timeout must be greater than zero".to_string(),
            ));
        }
        if self.pump_batch == 0 {
            return Err(ConfigError::ValidationError(
                "Pump batch size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// What happens when a function name is exposed twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuplicatePolicy {
    /// 后注册者覆盖
    Replace,
    /// 拒绝重复注册
    Reject,
}
