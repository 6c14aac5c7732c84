//! 编排层：决策步骤、主循环、过程事件

pub mod events;
pub mod loop_;
pub mod planner;

pub use events::ReactEvent;
pub use loop_::{Orchestrator, RunOutcome, RunStop, Session};
pub use planner::{classify, parse_wire_call, Decision, DecisionStep};
