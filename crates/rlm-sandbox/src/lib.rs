//! Sandboxed script sessions for rlm.
//!
//! A [`Session`] owns an embedded JavaScript runtime on a dedicated thread.
//! Code fragments submitted with [`Session::execute`] share one global
//! scope, so variables bound by one fragment are visible to the next.
//! Preloaded values and host capabilities are installed as read-only
//! globals; capability calls are proxied back to the host as async
//! requests and resolved through a [`CapabilityHandler`].

mod error;
mod guard;
mod guest;
mod output;
pub mod protocol;
mod session;


use async_trait::async_trait;

pub use error::SandboxError;
pub use guard::{check_code, is_valid_identifier};
pub use output::{truncate_output, ExecOutcome, EMPTY_STRING_OUTPUT, NO_OUTPUT};
pub use session::Session;

pub type Result<T> = std::result::Result<T, SandboxError>;

/// Resolves capability calls raised by code running inside a session.
///
/// Returning `Err` rejects the promise inside the session, which the
/// submitted code observes as an ordinary thrown error.
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    async fn call(
        &self,
        name: &str,
        args: Vec<serde_json::Value>,
    ) -> std::result::Result<serde_json::Value, String>;
}
