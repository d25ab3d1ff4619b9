//! The two agent-facing meta-tools and the handler plumbing that exposes
//! them to the host runtime.

mod handler;
mod factory;

pub use handler::{HandlerRegistry, ToolHandler};
pub use factory::{CallOutcome, ToolFactory, extract_output};

// Meta-tool handler implementations
mod find_tool;
mod call_tool;

pub use find_tool::FindToolHandler;
pub use call_tool::CallToolHandler;
