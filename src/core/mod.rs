//! 核心编排层：状态机、终止策略、错误、会话监管

pub mod error;
pub mod session_supervisor;
pub mod state;

#[cfg(test)]
mod proptests;

pub use error::OrchestrationError;
pub use session_supervisor::SessionSupervisor;
pub use state::{
    resume_state, transition, LoopContext, LoopEvent, LoopState, ResumeError, TerminalReason, TerminationPolicy,
    TransitionError, TransitionResult, DEFAULT_MAX_TOOL_ROUNDS,
};
