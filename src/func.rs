use crate::error::PoolError;

use std::fmt;

/// Storage for the wrapped callable. One-shot callables are consumed by their
/// first invocation, reusable ones stay in place.
enum Held<Args, Ret> {
  Reusable(Box<dyn FnMut(Args) -> Ret + Send + 'static>),
  Once(Box<dyn FnOnce(Args) -> Ret + Send + 'static>),
}

/// A move-only, type-erased callable with the fixed signature `Args -> Ret`.
///
/// Several arguments are passed as a tuple, no arguments as `()`. Any closure
/// matching the signature can be stored, so heterogeneous callables share a
/// single concrete type (the pool's task queue relies on this).
///
/// A `MovableFn` is never `Clone`: the wrapped callable may own move-only
/// state. It can be empty (see [`MovableFn::empty`], [`MovableFn::clear`] and
/// [`MovableFn::take`]); invoking an empty handle returns
/// [`PoolError::InvalidInvocation`] and has no other effect.
pub struct MovableFn<Args, Ret> {
  held: Option<Held<Args, Ret>>,
}

impl<Args, Ret> MovableFn<Args, Ret> {
  /// Wraps a callable that may be invoked any number of times.
  pub fn new<F>(f: F) -> Self
  where
    F: FnMut(Args) -> Ret + Send + 'static,
  {
    Self {
      held: Some(Held::Reusable(Box::new(f))),
    }
  }

  /// Wraps a callable that may be invoked at most once. The first invocation
  /// consumes it and leaves this handle empty.
  pub fn once<F>(f: F) -> Self
  where
    F: FnOnce(Args) -> Ret + Send + 'static,
  {
    Self {
      held: Some(Held::Once(Box::new(f))),
    }
  }

  /// Creates a handle holding nothing.
  pub fn empty() -> Self {
    Self { held: None }
  }

  /// Returns `true` if no callable is held.
  pub fn is_empty(&self) -> bool {
    self.held.is_none()
  }

  /// Drops the held callable, if any.
  pub fn clear(&mut self) {
    self.held = None;
  }

  /// Moves the held callable out into a new handle, leaving `self` empty.
  pub fn take(&mut self) -> Self {
    Self {
      held: self.held.take(),
    }
  }

  /// Calls the held callable with `args`.
  ///
  /// # Errors
  /// Returns `PoolError::InvalidInvocation` if the handle is empty, including a
  /// one-shot handle that was already invoked.
  pub fn invoke(&mut self, args: Args) -> Result<Ret, PoolError> {
    match &mut self.held {
      Some(Held::Reusable(f)) => return Ok(f(args)),
      Some(Held::Once(_)) => {}
      None => return Err(PoolError::InvalidInvocation),
    }

    match self.held.take() {
      Some(Held::Once(f)) => Ok(f(args)),
      _ => Err(PoolError::InvalidInvocation),
    }
  }
}

impl<Args, Ret> Default for MovableFn<Args, Ret> {
  fn default() -> Self {
    Self::empty()
  }
}

impl<Args, Ret> fmt::Debug for MovableFn<Args, Ret> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let kind = match self.held {
      Some(Held::Reusable(_)) => "reusable",
      Some(Held::Once(_)) => "once",
      None => "empty",
    };
    f.debug_struct("MovableFn").field("held", &kind).finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Arc;

  // Stands in for a callable capturing something that cannot be copied.
  struct Token(u32);

  #[test]
  fn test_invoke_reusable_forwards_args() {
    let mut add = MovableFn::new(|(a, b): (i32, i32)| a + b);
    assert_eq!(add.invoke((2, 3)), Ok(5));
    assert_eq!(add.invoke((40, 2)), Ok(42));
    assert!(!add.is_empty());
  }

  #[test]
  fn test_invoke_once_empties_handle() {
    let token = Token(7);
    let mut f = MovableFn::once(move |()| token.0 * 2);
    assert_eq!(f.invoke(()), Ok(14));
    assert!(f.is_empty());
    assert_eq!(f.invoke(()), Err(PoolError::InvalidInvocation));
  }

  #[test]
  fn test_empty_invocation_fails() {
    let mut f: MovableFn<(), ()> = MovableFn::empty();
    assert!(f.is_empty());
    assert_eq!(f.invoke(()), Err(PoolError::InvalidInvocation));

    let mut f: MovableFn<u8, u8> = MovableFn::default();
    assert_eq!(f.invoke(1), Err(PoolError::InvalidInvocation));
  }

  #[test]
  fn test_take_moves_callable_and_leaves_source_empty() {
    let mut source = MovableFn::new(|x: u32| x + 1);
    let mut target = source.take();

    assert!(source.is_empty());
    assert_eq!(source.invoke(1), Err(PoolError::InvalidInvocation));
    assert_eq!(target.invoke(1), Ok(2));
  }

  #[test]
  fn test_clear_drops_held_state() {
    let counter = Arc::new(AtomicUsize::new(0));
    let captured = counter.clone();
    let mut f = MovableFn::new(move |()| {
      captured.fetch_add(1, Ordering::SeqCst);
    });
    f.invoke(()).unwrap();
    assert_eq!(Arc::strong_count(&counter), 2);

    f.clear();
    assert!(f.is_empty());
    assert_eq!(Arc::strong_count(&counter), 1);
    assert_eq!(counter.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn test_reusable_keeps_state_between_calls() {
    let mut calls = 0u32;
    let mut f = MovableFn::new(move |()| {
      calls += 1;
      calls
    });
    assert_eq!(f.invoke(()), Ok(1));
    assert_eq!(f.invoke(()), Ok(2));
    assert_eq!(f.invoke(()), Ok(3));
  }

  #[test]
  fn test_debug_reports_state() {
    let mut f = MovableFn::once(|()| ());
    assert_eq!(format!("{:?}", f), "MovableFn { held: \"once\" }");
    f.invoke(()).unwrap();
    assert_eq!(format!("{:?}", f), "MovableFn { held: \"empty\" }");
  }
}
