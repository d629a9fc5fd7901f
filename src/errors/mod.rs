mod api_error;
mod mcp_error;
mod tool_error;

pub(crate) use api_error::transport_code;
pub use api_error::ApiError;
pub use mcp_error::{ErrorCode, McpError};
pub use tool_error::{ToolError, ToolErrorKind};
