use thiserror::Error;

/// Errors raised by session operations, independent of transport.
///
/// Recoverable variants (everything except [`SessionError::Io`],
/// [`SessionError::BackpressureOverrun`] and
/// [`SessionError::ProtocolViolation`]) are turned into a single
/// `answer error <reason>` (text) or a structured error answer (binary) by
/// the caller; the session itself continues running. The three terminal
/// variants always trigger teardown.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("invalid handle {0}")]
    InvalidHandle(u64),

    #[error("already subscribed")]
    AlreadySubscribed,

    #[error("wait and pop next command already pending for handle {0}")]
    AlreadyPendingPop(u64),

    #[error("{0}")]
    BadStartParameter(String),

    #[error("io failure: {0}")]
    Io(String),

    #[error("pending send size exceeded hard cap")]
    BackpressureOverrun,

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
}

impl SessionError {
    /// Terminal errors require `unsubscribe_all` plus marking the session
    /// invalid; everything else is answered and the session continues.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionError::Io(_) |
                SessionError::BackpressureOverrun |
                SessionError::ProtocolViolation(_)
        )
    }
}
