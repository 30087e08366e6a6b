pub mod errors;
pub mod id;

pub use errors::{ConfigError, RlmError};
pub use id::{new_correlation_id, new_id, InvocationId, SessionId};

pub type Result<T> = std::result::Result<T, RlmError>;
