#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("execution timed out after {limit_ms} ms")]
    Timeout { limit_ms: u64 },

    #[error("session is closed")]
    Closed,

    #[error("failed to spawn session thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("session initialization failed: {0}")]
    Init(String),

    #[error("session protocol violation: {0}")]
    Protocol(String),
}
