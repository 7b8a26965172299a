use thiserror::Error;

/// Failure modes of a single judge invocation.
///
/// Every variant is recoverable: the caller surfaces it to clients as an
/// ERROR event and continues serving other matches. None of these unwind
/// the server.
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("sandbox workspace setup failed: {0}")]
    Workspace(anyhow::Error),

    #[error("failed to spawn judge process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("judge exceeded the {limit_secs}s wall-clock limit and was killed")]
    Timeout { limit_secs: u64 },

    #[error("judge exited with status {code:?}: {output}")]
    JudgeFailed { code: Option<i32>, output: String },

    #[error("judge output is not a valid result block: {output}")]
    Unparsable { output: String },
}
