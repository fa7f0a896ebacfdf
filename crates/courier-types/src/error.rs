//! Error taxonomy shared across the courier crates.

/// Errors surfaced by the courier runtime.
///
/// The variants map to how the daemon reacts: gateway errors are retried by
/// the lifecycle manager, `AuthExpired` is terminal, corrupt local state is
/// logged and treated as empty, and an unsupported discovery strategy just
/// moves the reconciler to the next one.
#[derive(Debug, thiserror::Error)]
pub enum CourierError {
    /// Transient gateway fault; the lifecycle manager schedules a retry.
    #[error("gateway error: {0}")]
    Gateway(String),

    /// The session was logged out remotely. Terminal, no retry.
    #[error("session logged out, authentication expired")]
    AuthExpired,

    /// A persisted file could not be read or parsed. Never fatal.
    #[error("corrupt local state in {path}: {detail}")]
    CorruptLocalState { path: String, detail: String },

    /// A contact discovery source is not supported by the current session.
    #[error("discovery strategy unavailable: {0}")]
    StrategyUnavailable(String),

    /// An outbound send failed after the session accepted it.
    #[error("send failed: {0}")]
    SendFailure(String),

    /// Another live bot instance already holds the session. Fatal at
    /// startup.
    #[error("another instance holds the lock (pid {pid})")]
    DuplicateInstance { pid: u32 },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
