//! Platform Timers
//!
//! Command deadlines run on tokio's clock natively and on browser timers
//! when compiled to wasm32. Tests pause the tokio clock to simulate time.

use std::future::Future;
use std::time::Duration;

/// Returned when a deadline passes before the awaited future completes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elapsed;

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn unix_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(not(target_arch = "wasm32"))]
mod imp {
    use super::*;

    /// Point in time after which a pending command times out
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    pub struct Deadline(tokio::time::Instant);

    impl Deadline {
        pub fn after(duration: Duration) -> Self {
            Self(tokio::time::Instant::now() + duration)
        }

        pub fn remaining(&self) -> Duration {
            self.0.saturating_duration_since(tokio::time::Instant::now())
        }

        pub fn is_expired(&self) -> bool {
            tokio::time::Instant::now() >= self.0
        }
    }

    pub async fn with_deadline<F: Future>(deadline: Deadline, fut: F) -> Result<F::Output, Elapsed> {
        tokio::time::timeout_at(deadline.0, fut)
            .await
            .map_err(|_| Elapsed)
    }
}

#[cfg(target_arch = "wasm32")]
mod imp {
    use super::*;
    use futures::future::{select, Either};
    use gloo_timers::future::TimeoutFuture;

    /// Point in time after which a pending command times out
    #[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
    pub struct Deadline(f64);

    impl Deadline {
        pub fn after(duration: Duration) -> Self {
            Self(js_sys::Date::now() + duration.as_millis() as f64)
        }

        pub fn remaining(&self) -> Duration {
            let left = self.0 - js_sys::Date::now();
            if left <= 0.0 {
                Duration::ZERO
            } else {
                Duration::from_millis(left as u64)
            }
        }

        pub fn is_expired(&self) -> bool {
            js_sys::Date::now() >= self.0
        }
    }

    pub async fn with_deadline<F: Future>(deadline: Deadline, fut: F) -> Result<F::Output, Elapsed> {
        let millis = deadline.remaining().as_millis().min(u32::MAX as u128) as u32;
        let fut = std::pin::pin!(fut);
        let sleep = TimeoutFuture::new(millis);
        match select(fut, sleep).await {
            Either::Left((output, _)) => Ok(output),
            Either::Right(_) => Err(Elapsed),
        }
    }
}

pub use imp::{with_deadline, Deadline};

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_elapses_on_paused_clock() {
        let deadline = Deadline::after(Duration::from_millis(5000));
        let result = with_deadline(deadline, futures::future::pending::<()>()).await;
        assert_eq!(result, Err(Elapsed));
        assert_eq!(deadline.remaining(), Duration::ZERO);
        assert!(deadline.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires_without_being_awaited() {
        let deadline = Deadline::after(Duration::from_millis(5000));
        assert!(!deadline.is_expired());

        tokio::time::advance(Duration::from_millis(4999)).await;
        assert!(!deadline.is_expired());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(deadline.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_future_beats_deadline() {
        let deadline = Deadline::after(Duration::from_millis(10));
        let result = with_deadline(deadline, async { 42 }).await;
        assert_eq!(result, Ok(42));
    }

    #[test]
    fn test_unix_millis_is_positive() {
        assert!(unix_millis() > 0);
    }
}
