pub mod env_name;
pub mod redact;
pub mod suggest;
pub mod text;
