use thiserror::Error;

/// Errors that can occur within the `thread_orchestra` pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
  #[error("Pool is stopped, cannot accept new tasks")]
  PoolStopped,

  #[error("Submitted task panicked: {0}")]
  TaskPanicked(String),

  #[error("Attempted to invoke an empty callable")]
  InvalidInvocation,

  #[error("Task result channel error (task was dropped before it could run): {0}")]
  ResultChannelError(String),

  #[error("Task result already taken")]
  ResultUnavailable,

  #[error("Failed to spawn pool worker thread: {0}")]
  WorkerSpawnFailed(String),
}
