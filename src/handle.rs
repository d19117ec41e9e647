use crate::error::PoolError;

use futures::channel::oneshot;
use futures::executor::block_on;
use tracing;

type TaskOutcome<R> = Result<R, PoolError>;

/// A handle to a task submitted to the `ThreadPoolManager`.
///
/// The worker that runs the task writes its outcome exactly once. The handle
/// reads it either by blocking ([`TaskHandle::get`]) or by awaiting
/// ([`TaskHandle::await_result`]).
#[derive(Debug)]
pub struct TaskHandle<R: Send + 'static> {
  pub(crate) task_id: u64,
  pub(crate) result_receiver: Option<oneshot::Receiver<TaskOutcome<R>>>,
  // Filled by `is_finished` when it observes the outcome before `get`.
  pub(crate) ready: Option<TaskOutcome<R>>,
}

impl<R: Send + 'static> TaskHandle<R> {
  pub(crate) fn new(task_id: u64, result_receiver: oneshot::Receiver<TaskOutcome<R>>) -> Self {
    Self {
      task_id,
      result_receiver: Some(result_receiver),
      ready: None,
    }
  }

  /// Returns the unique ID of this task.
  pub fn id(&self) -> u64 {
    self.task_id
  }

  /// Checks without blocking whether the task's outcome has been written.
  ///
  /// A task that was dropped without running also counts as finished; its
  /// result is a `PoolError::ResultChannelError`.
  pub fn is_finished(&mut self) -> bool {
    if self.ready.is_some() {
      return true;
    }
    let Some(rx) = self.result_receiver.as_mut() else {
      return false;
    };
    match rx.try_recv() {
      Ok(Some(outcome)) => {
        self.ready = Some(outcome);
        self.result_receiver = None;
        true
      }
      Ok(None) => false,
      Err(canceled) => {
        self.ready = Some(Err(self.channel_error(canceled)));
        self.result_receiver = None;
        true
      }
    }
  }

  /// Blocks the calling thread until the task completes and returns its result.
  ///
  /// Must not be called from inside an async runtime worker; use
  /// [`TaskHandle::await_result`] there.
  ///
  /// # Errors
  /// Returns `PoolError::TaskPanicked` if the task panicked during execution.
  /// Returns `PoolError::ResultChannelError` if the task was dropped without running.
  pub fn get(self) -> TaskOutcome<R> {
    block_on(self.await_result())
  }

  /// Awaits the completion of the task and returns its result of type `R`.
  ///
  /// # Errors
  /// Same as [`TaskHandle::get`].
  pub async fn await_result(mut self) -> TaskOutcome<R> {
    if let Some(outcome) = self.ready.take() {
      return outcome;
    }
    match self.result_receiver.take() {
      Some(rx) => match rx.await {
        Ok(outcome) => outcome,
        Err(canceled) => Err(self.channel_error(canceled)),
      },
      None => Err(PoolError::ResultUnavailable),
    }
  }

  fn channel_error(&self, canceled: oneshot::Canceled) -> PoolError {
    // The sender is only dropped unsent when a queued task is discarded,
    // which happens when a pool without workers is torn down.
    tracing::warn!(task_id = %self.task_id, "Result channel closed before the task ran: {}", canceled);
    PoolError::ResultChannelError(format!(
      "Task (id: {}) result channel unexpectedly closed: {}",
      self.task_id, canceled
    ))
  }
}
