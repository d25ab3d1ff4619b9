//! Error taxonomy for indexing and dispatch.
//!
//! Every variant renders as `<Kind>: <message>` so the text can be handed to
//! the calling agent unchanged.

use thiserror::Error;

pub type OptimizerResult<T> = Result<T, OptimizerError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OptimizerError {
    /// Enumerating a server's tools failed.
    #[error("ConnectionError: {server}: {message}")]
    Connection { server: String, message: String },

    #[error("ToolNotFoundError: {0} not found")]
    ToolNotFound(String),

    /// The remote tool failed, returned malformed output, or its session is gone.
    #[error("ExecutionError: {tool}: {message}")]
    Execution { tool: String, message: String },

    #[error("InvalidArguments: {0}")]
    InvalidArguments(String),

    #[error("ConfigError: {0}")]
    Config(String),
}

impl OptimizerError {
    /// Short kind name, as used in the structured error payload.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "ConnectionError",
            Self::ToolNotFound(_) => "ToolNotFoundError",
            Self::Execution { .. } => "ExecutionError",
            Self::InvalidArguments(_) => "InvalidArguments",
            Self::Config(_) => "ConfigError",
        }
    }

    pub fn connection(server: impl Into<String>, message: impl ToString) -> Self {
        Self::Connection {
            server: server.into(),
            message: message.to_string(),
        }
    }

    pub fn execution(tool: impl Into<String>, message: impl ToString) -> Self {
        Self::Execution {
            tool: tool.into(),
            message: message.to_string(),
        }
    }
}
