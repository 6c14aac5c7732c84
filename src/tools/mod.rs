pub mod balance;
pub mod executor;
pub mod exit;
pub mod outcome;
pub mod registry;
pub mod schema;
pub mod sql;
pub mod web_search;
pub mod wikipedia;

pub use balance::BlockscoutClient;
pub use executor::ToolExecutor;
pub use outcome::{ToolCall, ToolFailure, ToolOutcome, ToolResult};
pub use registry::{RegistryError, SideEffect, ToolContext, ToolDeclaration, ToolKind, ToolRegistry};
pub use wikipedia::{KnowledgeSource, WikipediaClient};
