//! Cancellation token and the process-wide SIGINT broker.
//!
//! Exactly one SIGINT handler exists, owned by the broker. The first signal
//! trips the shared token and arms the hard-exit clock; later signals are
//! ignored. The broker never touches git state itself.

use std::{
   sync::{
      Arc,
      atomic::{AtomicBool, Ordering},
   },
   thread,
   time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};

use crate::error::{GitcommError, Result};

/// Budget for restoring the staging snapshot after a failure or interrupt.
pub const RESTORE_BUDGET: Duration = Duration::from_secs(3);

/// Hard ceiling between the first SIGINT and process exit.
pub const EXIT_BUDGET: Duration = Duration::from_secs(5);

// === Cancellation token ===

struct TokenInner {
   cancelled: Mutex<bool>,
   condvar:   Condvar,
   deadline:  Option<Instant>,
}

/// Shared cancellation signal. Cheap to clone; all clones observe the trip.
#[derive(Clone)]
pub struct CancelToken {
   inner: Arc<TokenInner>,
}

impl Default for CancelToken {
   fn default() -> Self {
      Self::new()
   }
}

impl CancelToken {
   pub fn new() -> Self {
      Self {
         inner: Arc::new(TokenInner {
            cancelled: Mutex::new(false),
            condvar:   Condvar::new(),
            deadline:  None,
         }),
      }
   }

   /// A fresh token that trips on its own after `deadline`. Used for the
   /// restoration budget, which must run even after the main token tripped.
   pub fn with_deadline(deadline: Duration) -> Self {
      let token = Self {
         inner: Arc::new(TokenInner {
            cancelled: Mutex::new(false),
            condvar:   Condvar::new(),
            deadline:  Some(Instant::now() + deadline),
         }),
      };
      let watchdog = token.clone();
      thread::spawn(move || {
         if !watchdog.wait_timeout(deadline) {
            watchdog.cancel();
         }
      });
      token
   }

   /// Time left until this token's deadline, if it carries one. Callers cap
   /// their own operation timeouts to this.
   pub fn remaining(&self) -> Option<Duration> {
      self
         .inner
         .deadline
         .map(|at| at.saturating_duration_since(Instant::now()))
   }

   pub fn cancel(&self) {
      let mut cancelled = self.inner.cancelled.lock();
      *cancelled = true;
      self.inner.condvar.notify_all();
   }

   pub fn is_cancelled(&self) -> bool {
      *self.inner.cancelled.lock()
   }

   /// Block until the token trips or `timeout` elapses. Returns whether the
   /// token tripped.
   pub fn wait_timeout(&self, timeout: Duration) -> bool {
      let deadline = Instant::now() + timeout;
      let mut cancelled = self.inner.cancelled.lock();
      while !*cancelled {
         if self
            .inner
            .condvar
            .wait_until(&mut cancelled, deadline)
            .timed_out()
         {
            return *cancelled;
         }
      }
      true
   }

   /// Error out if the token has tripped. Called at every state boundary.
   pub fn checkpoint(&self) -> Result<()> {
      if self.is_cancelled() {
         Err(GitcommError::Cancelled)
      } else {
         Ok(())
      }
   }
}

// === SIGINT broker ===

/// Owns the single SIGINT handler and the shared token.
pub struct SignalBroker {
   token:    CancelToken,
   restored: Arc<AtomicBool>,
}

impl SignalBroker {
   /// Install the process-wide handler. Must run before the first blocking
   /// operation of the workflow.
   pub fn install() -> Result<Self> {
      let token = CancelToken::new();
      let restored = Arc::new(AtomicBool::new(false));

      let handler_token = token.clone();
      let handler_restored = Arc::clone(&restored);
      let fired = AtomicBool::new(false);
      ctrlc::set_handler(move || {
         if fired.swap(true, Ordering::SeqCst) {
            // Later SIGINTs within the same run are ignored
            return;
         }
         eprintln!("\nInterrupted. Restoring staging state...");
         handler_token.cancel();

         let exit_restored = Arc::clone(&handler_restored);
         thread::spawn(move || {
            thread::sleep(EXIT_BUDGET);
            if !exit_restored.load(Ordering::SeqCst) {
               eprintln!(
                  "Warning: staging state may not be fully restored; inspect `git status` \
                   manually."
               );
            }
            std::process::exit(130);
         });
      })
      .map_err(|e| GitcommError::Config(format!("failed to install signal handler: {e}")))?;

      Ok(Self { token, restored })
   }

   pub fn token(&self) -> CancelToken {
      self.token.clone()
   }

   /// Mark restoration finished so the hard-exit clock skips its warning.
   pub fn mark_restored(&self) {
      self.restored.store(true, Ordering::SeqCst);
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_token_trips_once_for_all_clones() {
      let token = CancelToken::new();
      let clone = token.clone();
      assert!(!clone.is_cancelled());
      token.cancel();
      assert!(clone.is_cancelled());
      assert!(clone.checkpoint().is_err());
   }

   #[test]
   fn test_wait_timeout_returns_on_cancel() {
      let token = CancelToken::new();
      let waiter = token.clone();
      let handle = thread::spawn(move || waiter.wait_timeout(Duration::from_secs(5)));
      thread::sleep(Duration::from_millis(20));
      token.cancel();
      assert!(handle.join().unwrap());
   }

   #[test]
   fn test_wait_timeout_times_out() {
      let token = CancelToken::new();
      let start = Instant::now();
      assert!(!token.wait_timeout(Duration::from_millis(30)));
      assert!(start.elapsed() >= Duration::from_millis(30));
   }

   #[test]
   fn test_deadline_token_trips_itself() {
      let token = CancelToken::with_deadline(Duration::from_millis(30));
      assert!(!token.is_cancelled());
      assert!(token.wait_timeout(Duration::from_millis(500)));
      assert!(token.is_cancelled());
   }

   #[test]
   fn test_remaining_only_on_deadline_tokens() {
      assert_eq!(CancelToken::new().remaining(), None);

      let token = CancelToken::with_deadline(Duration::from_secs(3));
      let remaining = token.remaining().unwrap();
      assert!(remaining <= Duration::from_secs(3));
      assert!(remaining > Duration::from_secs(2));
   }

   #[test]
   fn test_remaining_saturates_at_zero() {
      let token = CancelToken::with_deadline(Duration::from_millis(10));
      thread::sleep(Duration::from_millis(40));
      assert_eq!(token.remaining(), Some(Duration::ZERO));
   }
}
