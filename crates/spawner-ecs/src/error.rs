//! Error types for cluster backend calls.

use spawner_core::{ContextError, SpawnError};
use thiserror::Error;

/// Errors a [`ClusterBackend`](crate::ClusterBackend) call can return.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The service answered with an error code.
    #[error("{code}: {message}")]
    Api { code: String, message: String },

    /// The service accepted the call but could not fulfil it.
    #[error("{0}")]
    Failure(String),

    /// The request never got a usable answer.
    #[error("transport: {0}")]
    Transport(String),

    /// The answer could not be understood.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Missing region, credentials or endpoint.
    #[error("config: {0}")]
    Config(String),

    /// The caller's context ended while the call was in flight.
    #[error(transparent)]
    Cancelled(#[from] ContextError),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Where in an operation a backend call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Submitting the run request.
    Submit,
    /// Polling for the running state.
    Poll,
    /// Resolving the network address.
    Resolve,
    /// Anything else: stop, list, describe outside the poll loop.
    Other,
}

impl BackendError {
    /// Returns true if the service answered and refused the call.
    ///
    /// Transport and decoding failures leave the outcome unknown: the
    /// service may have acted on the request.
    pub fn is_refusal(&self) -> bool {
        matches!(self, Self::Api { .. } | Self::Failure(_) | Self::Config(_))
    }

    /// Classify this failure into the caller-facing taxonomy.
    ///
    /// Cancellation keeps its identity whatever the phase. A submission is
    /// only reported as rejected when the service refused it.
    pub fn into_spawn_error(self, phase: Phase) -> SpawnError {
        if let Self::Cancelled(err) = self {
            return SpawnError::Cancelled(err);
        }
        let refused = self.is_refusal();
        let msg = self.to_string();
        match phase {
            Phase::Submit if refused => SpawnError::Rejected(msg),
            Phase::Submit => SpawnError::Backend(format!("run request outcome unknown: {msg}")),
            Phase::Poll => SpawnError::Query(msg),
            Phase::Resolve => SpawnError::Attachment(msg),
            Phase::Other => SpawnError::Backend(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_classification() {
        let api = || BackendError::Api {
            code: "InvalidParameterException".to_string(),
            message: "subnet sn-x does not exist".to_string(),
        };

        assert!(matches!(
            api().into_spawn_error(Phase::Submit),
            SpawnError::Rejected(msg) if msg == "InvalidParameterException: subnet sn-x does not exist"
        ));
        assert!(matches!(api().into_spawn_error(Phase::Poll), SpawnError::Query(_)));
        assert!(matches!(
            api().into_spawn_error(Phase::Resolve),
            SpawnError::Attachment(_)
        ));
        assert!(matches!(api().into_spawn_error(Phase::Other), SpawnError::Backend(_)));
    }

    #[test]
    fn test_unreadable_submit_answer_is_not_a_rejection() {
        let err = BackendError::Malformed("RunTask response: EOF".to_string())
            .into_spawn_error(Phase::Submit);
        assert!(matches!(
            err,
            SpawnError::Backend(ref msg) if msg.starts_with("run request outcome unknown")
        ));

        let err = BackendError::Transport("connection reset".to_string())
            .into_spawn_error(Phase::Submit);
        assert!(matches!(err, SpawnError::Backend(_)));

        let err = BackendError::Failure("MISSING".to_string()).into_spawn_error(Phase::Submit);
        assert!(matches!(err, SpawnError::Rejected(_)));
    }

    #[test]
    fn test_cancellation_survives_classification() {
        let err = BackendError::Cancelled(ContextError::Cancelled).into_spawn_error(Phase::Poll);
        assert!(err.is_cancellation());
    }
}
