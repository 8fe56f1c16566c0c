//! 统一错误处理模块
//!
//! Error types shared by every layer of the bridge.
//!
//! ## 错误类型分层
//!
//! - [`CodecError`]: wire text that cannot be decoded, or values that cannot be encoded
//! - [`BridgeError`]: everything the controller, registry, tracker and handles report
//!
//! Protocol-level failures (malformed messages, unknown sequence numbers) never
//! surface to the caller of `on_inbound_message`; they are logged and dropped.

use thiserror::Error;

use crate::config::ConfigError;

/// 编解码错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Message is not a structured object")]
    NotAnObject,

    #[error("Message is missing field `{0}`")]
    MissingField(&'static str),

    #[error("Field `{field}` has an invalid value: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Value cannot be represented on the wire: {0}")]
    Serialize(String),

    #[error("Value does not match the expected type: {0}")]
    Deserialize(String),
}

/// 桥接核心错误类型
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Function not exposed: {0}")]
    UnknownFunction(String),

    #[error("Function already exposed: {0}")]
    DuplicateFunction(String),

    #[error("Invalid function name: {0:?}")]
    InvalidFunctionName(String),

    #[error("Invalid argument {index}: {reason}")]
    InvalidArgument { index: usize, reason: String },

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Call {0} has already been resolved")]
    AlreadyResolved(u32),

    #[error("Call {seq} was discarded")]
    Discarded { seq: u32 },

    #[error("Call {seq} timed out after {millis}ms")]
    Timeout { seq: u32, millis: u64 },

    #[error("Sequence numbers exhausted")]
    SequenceExhausted,

    #[error("Bridge has been shut down")]
    Closed,

    #[error("Script error: {0}")]
    Script(String),

    #[error("Runtime error: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// 桥接结果类型别名
pub type BridgeResult<T> = Result<T, BridgeError>;
pub type CodecResult<T> = Result<T, CodecError>;
