//! A fixed-size OS thread pool with a shared FIFO queue, result handles and
//! panic capture, plus a move-only type-erased callable.

mod error;
mod func;
mod handle;
mod manager;
mod task;
mod task_queue;

pub use error::PoolError;
pub use func::MovableFn;
pub use handle::TaskHandle;
pub use manager::ThreadPoolManager;
