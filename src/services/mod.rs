pub mod cache;
pub mod credentials;
pub mod lawmatics;
pub mod logger;
pub mod security;
pub mod tool_executor;
pub mod validation;
