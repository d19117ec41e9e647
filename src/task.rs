use crate::error::PoolError;
use crate::func::MovableFn;
use crate::handle::TaskHandle;

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use futures::channel::oneshot;
use tracing::{debug, trace};

/// The type-erased unit of work stored in the pool's queue.
pub(crate) type Job = MovableFn<(), ()>;

/// Internal representation of a task managed by the pool.
///
/// Owns everything the user's callable captured. A `Task` is consumed by
/// [`Task::run`], so it can execute at most once.
pub(crate) struct Task {
  pub(crate) task_id: u64,
  job: Job,
}

impl fmt::Debug for Task {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Task")
      .field("task_id", &self.task_id)
      .finish_non_exhaustive()
  }
}

impl Task {
  pub(crate) fn new(task_id: u64, job: impl FnOnce() + Send + 'static) -> Self {
    Self {
      task_id,
      job: MovableFn::once(move |()| job()),
    }
  }

  /// Runs the task on the calling thread.
  pub(crate) fn run(mut self) -> Result<(), PoolError> {
    self.job.invoke(())
  }
}

/// Pairs a queued [`Task`] with the [`TaskHandle`] its caller keeps.
///
/// The task runs `f`, catches a panic at that boundary, and writes the
/// outcome into the handle's channel.
pub(crate) fn create_task<T, F>(task_id: u64, f: F) -> (Task, TaskHandle<T>)
where
  T: Send + 'static,
  F: FnOnce() -> T + Send + 'static,
{
  let (result_tx, result_rx) = oneshot::channel::<Result<T, PoolError>>();

  let task = Task::new(task_id, move || {
    let outcome = match panic::catch_unwind(AssertUnwindSafe(f)) {
      Ok(value) => Ok(value),
      Err(payload) => {
        let message = panic_message(payload.as_ref());
        debug!(%task_id, "Task panicked during execution: {}", message);
        Err(PoolError::TaskPanicked(message))
      }
    };

    if result_tx.send(outcome).is_err() {
      trace!(%task_id, "Result receiver for task was dropped. Task outcome discarded.");
    }
  });

  (task, TaskHandle::new(task_id, result_rx))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(message) = payload.downcast_ref::<&'static str>() {
    (*message).to_string()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "non-string panic payload".to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_task_runs_and_fills_handle() {
    let (task, handle) = create_task(10, || 56 * 3);
    assert_eq!(task.task_id, 10);
    assert_eq!(handle.id(), 10);
    task.run().unwrap();
    assert_eq!(handle.get(), Ok(168));
  }

  #[test]
  fn test_panic_is_captured_with_message() {
    let (task, handle) = create_task(11, || -> u8 { panic!("bad input {}", 7) });
    assert_eq!(task.run(), Ok(()));
    assert_eq!(handle.get(), Err(PoolError::TaskPanicked("bad input 7".to_string())));

    let (task, handle) = create_task(12, || -> u8 { panic!("static message") });
    task.run().unwrap();
    assert_eq!(handle.get(), Err(PoolError::TaskPanicked("static message".to_string())));
  }

  #[test]
  fn test_non_string_payload() {
    let (task, handle) = create_task(13, || -> u8 { std::panic::panic_any(42u32) });
    task.run().unwrap();
    assert_eq!(
      handle.get(),
      Err(PoolError::TaskPanicked("non-string panic payload".to_string()))
    );
  }

  #[test]
  fn test_dropped_handle_does_not_fail_task() {
    let (task, handle) = create_task(14, || "unused");
    drop(handle);
    assert_eq!(task.run(), Ok(()));
  }

  #[test]
  fn test_dropped_task_closes_handle() {
    let (task, handle) = create_task(15, || 1);
    drop(task);
    assert!(matches!(handle.get(), Err(PoolError::ResultChannelError(_))));
  }
}
