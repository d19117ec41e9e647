use crate::error::PoolError;
use crate::handle::TaskHandle;
use crate::task::create_task;
use crate::task_queue::TaskQueue;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use dashmap::DashMap;
use tracing::{debug, error, info, info_span, trace, warn};

lazy_static::lazy_static! {
  static ref NEXT_POOL_TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(0);
}

/// State shared between the manager and its worker threads.
#[derive(Debug)]
struct PoolShared {
  pool_name: Arc<String>,
  queue: TaskQueue,
  // Running task id -> name of the worker executing it.
  active_task_info: DashMap<u64, Arc<str>>,
  completed_tasks: AtomicU64,
}

/// A fixed-size pool of OS worker threads fed from one shared FIFO queue.
///
/// Workers are spawned by [`ThreadPoolManager::new`] and live until the
/// manager is dropped. Dropping the manager stops the queue, lets the workers
/// drain every task that was already submitted, and joins them. Submissions
/// made after the stop are rejected with `PoolError::PoolStopped`.
pub struct ThreadPoolManager {
  shared: Arc<PoolShared>,
  thread_count: usize,
  workers: Vec<JoinHandle<()>>,
}

impl fmt::Debug for ThreadPoolManager {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ThreadPoolManager")
      .field("pool_name", &self.shared.pool_name)
      .field("thread_count", &self.thread_count)
      .field("queued_tasks", &self.shared.queue.len())
      .field("active_tasks", &self.active_tasks())
      .finish_non_exhaustive()
  }
}

impl ThreadPoolManager {
  /// Creates a pool and starts `thread_count` worker threads before returning.
  ///
  /// A pool with zero threads is valid: it accepts tasks but never runs them,
  /// and their handles report `PoolError::ResultChannelError` once the pool
  /// is dropped.
  ///
  /// # Errors
  /// Returns `PoolError::WorkerSpawnFailed` if the OS refuses to start a
  /// thread. Workers that did start are stopped and joined first.
  pub fn new(thread_count: usize, pool_name: &str) -> Result<Self, PoolError> {
    let shared = Arc::new(PoolShared {
      pool_name: Arc::new(pool_name.to_string()),
      queue: TaskQueue::new(),
      active_task_info: DashMap::new(),
      completed_tasks: AtomicU64::new(0),
    });

    let mut manager = Self {
      shared,
      thread_count,
      workers: Vec::with_capacity(thread_count),
    };

    for worker_index in 0..thread_count {
      let worker_shared = manager.shared.clone();
      let thread_name: Arc<str> = Arc::from(format!("{}-worker-{}", pool_name, worker_index));

      let spawn_result = thread::Builder::new()
        .name(thread_name.to_string())
        .spawn(move || Self::run_worker_loop(worker_shared, worker_index, thread_name));

      match spawn_result {
        Ok(join_handle) => manager.workers.push(join_handle),
        Err(spawn_error) => {
          error!(pool_name = %pool_name, worker = worker_index, "Failed to spawn worker thread: {}", spawn_error);
          // Dropping the partially built manager joins the workers already running.
          return Err(PoolError::WorkerSpawnFailed(spawn_error.to_string()));
        }
      }
    }

    if thread_count == 0 {
      warn!(pool_name = %pool_name, "Pool created without worker threads. Submitted tasks will never run.");
    }
    info!(pool_name = %pool_name, thread_count, "Thread pool started.");

    Ok(manager)
  }

  pub fn name(&self) -> &str {
    &self.shared.pool_name
  }

  /// Returns the number of worker threads this pool was created with.
  pub fn thread_count(&self) -> usize {
    self.thread_count
  }

  /// Returns the current number of tasks in the pending queue.
  pub fn queued_task_count(&self) -> usize {
    self.shared.queue.len()
  }

  /// Returns the number of tasks currently executing on a worker.
  pub fn active_task_count(&self) -> usize {
    self.shared.active_task_info.len()
  }

  // Sorted by task id so `Debug` output is stable.
  fn active_tasks(&self) -> Vec<(u64, Arc<str>)> {
    let mut active: Vec<(u64, Arc<str>)> = self
      .shared
      .active_task_info
      .iter()
      .map(|entry| (*entry.key(), entry.value().clone()))
      .collect();
    active.sort_unstable_by_key(|(task_id, _)| *task_id);
    active
  }

  /// Returns the number of tasks that finished running, including those that panicked.
  pub fn completed_task_count(&self) -> u64 {
    self.shared.completed_tasks.load(AtomicOrdering::Acquire)
  }

  /// Queues `f` for execution on a worker thread and returns immediately.
  ///
  /// # Errors
  /// Returns `PoolError::PoolStopped` if the pool has begun tearing down. `f`
  /// is dropped without running in that case.
  pub fn submit<T, F>(&self, f: F) -> Result<TaskHandle<T>, PoolError>
  where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
  {
    let task_id = NEXT_POOL_TASK_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed);
    let (task, handle) = create_task(task_id, f);

    match self.shared.queue.push(task) {
      Ok(()) => {
        debug!(pool_name = %self.shared.pool_name, %task_id, "Submitted task to queue.");
        Ok(handle)
      }
      Err(push_error) => {
        warn!(pool_name = %self.shared.pool_name, %task_id, "Submit: Attempted to submit task to a stopped pool.");
        Err(push_error)
      }
    }
  }

  /// Queues `f(args)` for execution on a worker thread. `args` is moved into
  /// the task; pass a tuple for several arguments.
  ///
  /// # Errors
  /// Same as [`ThreadPoolManager::submit`].
  pub fn submit_with<A, T, F>(&self, f: F, args: A) -> Result<TaskHandle<T>, PoolError>
  where
    A: Send + 'static,
    T: Send + 'static,
    F: FnOnce(A) -> T + Send + 'static,
  {
    self.submit(move || f(args))
  }

  /// Stops accepting tasks, wakes every worker and joins them.
  ///
  /// Calling it again is a no-op since the join handles are drained.
  fn stop_and_join(&mut self) {
    if self.shared.queue.is_stopped() && self.workers.is_empty() {
      trace!(pool_name = %self.shared.pool_name, "Pool already stopped. Nothing to join.");
      return;
    }

    info!(
      pool_name = %self.shared.pool_name,
      queued_tasks = self.shared.queue.len(),
      "Stopping pool. Workers will drain queued tasks before exiting."
    );
    self.shared.queue.stop();

    let current_thread = thread::current().id();
    for join_handle in self.workers.drain(..) {
      let thread_name = join_handle.thread().name().unwrap_or("<unnamed>").to_string();
      if join_handle.thread().id() == current_thread {
        // Dropped from inside one of our own tasks. That worker finishes the
        // task, sees the stopped queue and exits without being joined.
        debug!(pool_name = %self.shared.pool_name, worker = %thread_name, "Pool dropped on its own worker. Detaching it.");
        continue;
      }
      if join_handle.join().is_err() {
        error!(pool_name = %self.shared.pool_name, worker = %thread_name, "Worker thread panicked outside a task.");
      } else {
        trace!(pool_name = %self.shared.pool_name, worker = %thread_name, "Worker thread joined.");
      }
    }

    info!(
      pool_name = %self.shared.pool_name,
      completed_tasks = self.completed_task_count(),
      "Pool stopped. Workers joined."
    );
  }

  fn run_worker_loop(shared: Arc<PoolShared>, worker_index: usize, thread_name: Arc<str>) {
    let span = info_span!("pool_worker", pool_name = %shared.pool_name, worker = worker_index);
    let _entered = span.enter();
    debug!("Worker loop started.");

    while let Some(task) = shared.queue.pop_blocking() {
      let task_id = task.task_id;
      shared.active_task_info.insert(task_id, thread_name.clone());
      trace!(%task_id, "Dequeued task. Executing.");

      if let Err(run_error) = task.run() {
        error!(%task_id, "Task could not be executed: {}", run_error);
      }

      shared.active_task_info.remove(&task_id);
      shared.completed_tasks.fetch_add(1, AtomicOrdering::AcqRel);
      trace!(%task_id, "Task finished.");
    }

    debug!("Queue stopped and empty. Worker loop terminating.");
  }
}

impl Drop for ThreadPoolManager {
  fn drop(&mut self) {
    self.stop_and_join();
  }
}
