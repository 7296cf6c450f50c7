//! Error types for the optimization framework.

use atc_core::{CoreError, ErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum OptimError {
    /// `start` was called before `set_objective`.
    #[error("misuse: objective must be set before starting {algorithm}")]
    MissingObjective { algorithm: &'static str },

    #[error("no algorithm named '{0}' is registered")]
    UnknownAlgorithm(String),

    #[error("no objective named '{0}' is registered")]
    UnknownObjective(String),

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("algorithm worker stopped without reporting a result")]
    WorkerDisconnected,
}

impl OptimError {
    pub(crate) fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        OptimError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// A fault raised while installing or evaluating one candidate. The
    /// search logs it, drops the candidate and carries on.
    pub fn is_transient(&self) -> bool {
        matches!(self, OptimError::Core(err) if err.kind() == ErrorKind::InvalidConfiguration)
    }
}

pub type Result<T> = std::result::Result<T, OptimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_transient_faults() {
        let bad_speed = OptimError::from(CoreError::NonPositiveSpeed { id: 1, speed: 0.0 });
        assert!(bad_speed.is_transient());

        let broken = OptimError::from(CoreError::InvariantViolation("unsorted".into()));
        assert!(!broken.is_transient());
        assert!(!OptimError::MissingObjective { algorithm: "x" }.is_transient());
    }
}
