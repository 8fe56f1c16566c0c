pub mod stub;
pub mod thread_safe;

pub use stub::ScriptStubs;
pub use thread_safe::{context_channel, ContextQueue, ContextSender, ScriptHost, WorkItem};
