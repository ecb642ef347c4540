//! Listener retry configuration

use std::time::Duration;

/// Wait applied between a failed subscription and the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
   /// Same delay before every attempt
   Fixed(Duration),
   /// Delay doubles with each consecutive failure, capped at `max`
   Exponential { initial: Duration, max: Duration },
}

impl Backoff {
   /// Delay before retrying after the `failures`-th consecutive failure (1-based).
   pub fn delay(&self, failures: u32) -> Duration {
      match *self {
         Backoff::Fixed(delay) => delay,
         Backoff::Exponential { initial, max } => {
            let factor = 1u32
               .checked_shl(failures.saturating_sub(1))
               .unwrap_or(u32::MAX);
            initial.saturating_mul(factor).min(max)
         }
      }
   }
}

impl Default for Backoff {
   fn default() -> Self {
      Backoff::Fixed(Duration::from_secs(1))
   }
}

/// Configuration for a [`ChangeListener`](crate::ChangeListener)
///
/// # Examples
///
/// ```
/// use docfeed_observer::{Backoff, ListenerConfig};
/// use std::time::Duration;
///
/// // Retry forever, once a second
/// let config = ListenerConfig::default();
///
/// // Give up after five consecutive failures
/// let config = ListenerConfig {
///    backoff: Backoff::Exponential {
///       initial: Duration::from_millis(250),
///       max: Duration::from_secs(30),
///    },
///    max_retries: Some(5),
/// };
/// ```
#[derive(Debug, Clone, Default)]
pub struct ListenerConfig {
   /// Delay between resubscription attempts
   ///
   /// Default: fixed 1 second
   pub backoff: Backoff,

   /// Consecutive transient failures tolerated before giving up
   ///
   /// The count resets whenever a subscription delivers a change.
   ///
   /// Default: `None` (retry forever)
   pub max_retries: Option<u32>,
}
