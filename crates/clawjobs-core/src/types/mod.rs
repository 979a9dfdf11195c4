//! Domain and wire types.

pub mod message;
pub mod run;
pub mod task;

pub use message::{
    ApiErrorBody, ApiErrorDetail, ContentBlock, Message, MessageContent, MessageRequest,
    MessageResponse, Role, StopReason, ToolDefinition,
};
pub use run::{RunId, RunRecord, RunStatus};
pub use task::{
    DEFAULT_MAX_TOKENS, MAX_MAX_TOKENS, MIN_MAX_TOKENS, Schedule, ScheduleKind, Task, TaskId,
};
