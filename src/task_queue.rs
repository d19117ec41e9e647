use crate::error::PoolError;
use crate::task::Task;

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

/// Queue contents and the shutdown flag, always read and written together
/// under one lock.
#[derive(Debug, Default)]
struct QueueState {
  tasks: VecDeque<Task>,
  stopped: bool,
}

/// An unbounded, multi-producer, multi-consumer FIFO of pending tasks.
///
/// Producers notify one waiting worker per pushed task. [`TaskQueue::stop`]
/// notifies every worker. Once stopped the queue rejects new tasks, but
/// consumers keep receiving already queued tasks until it is empty.
#[derive(Debug, Default)]
pub(crate) struct TaskQueue {
  state: Mutex<QueueState>,
  task_available: Condvar,
}

impl TaskQueue {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  /// Appends a task to the tail of the queue and wakes one idle worker.
  ///
  /// On `PoolError::PoolStopped` the task is dropped without running.
  pub(crate) fn push(&self, task: Task) -> Result<(), PoolError> {
    {
      let mut state = self.state.lock();
      if state.stopped {
        return Err(PoolError::PoolStopped);
      }
      state.tasks.push_back(task);
    }
    self.task_available.notify_one();
    Ok(())
  }

  /// Blocks until a task is available or the queue is stopped.
  ///
  /// Returns `None` only once the queue is both stopped and empty.
  pub(crate) fn pop_blocking(&self) -> Option<Task> {
    let mut state = self.state.lock();
    loop {
      if let Some(task) = state.tasks.pop_front() {
        return Some(task);
      }
      if state.stopped {
        return None;
      }
      self.task_available.wait(&mut state);
    }
  }

  /// Marks the queue as stopped and wakes every waiting worker.
  pub(crate) fn stop(&self) {
    self.state.lock().stopped = true;
    self.task_available.notify_all();
  }

  pub(crate) fn is_stopped(&self) -> bool {
    self.state.lock().stopped
  }

  /// Returns the number of tasks waiting to be dequeued.
  pub(crate) fn len(&self) -> usize {
    self.state.lock().tasks.len()
  }
}
