//! Bounded pool for calls into external providers.
//!
//! A call first takes a permit (waiting at most the call timeout), then runs
//! on its own worker thread while the caller waits on a channel with the same
//! timeout. The permit travels with the worker and is only returned when the
//! provider call actually finishes, so a hung provider keeps its slot and the
//! number of in-flight calls never exceeds the pool size. A result that
//! arrives after the timeout is dropped.

use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::config::ProviderParams;
use crate::error::ProviderError;

struct Permits {
    available: Mutex<usize>,
    freed: Condvar,
}

/// Returned to the pool on drop.
struct Permit {
    permits: Arc<Permits>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        *self.permits.available.lock() += 1;
        self.permits.freed.notify_one();
    }
}

pub struct ProviderPool {
    permits: Arc<Permits>,
    size: usize,
    timeout: Duration,
    retries: u32,
    backoff_base: Duration,
}

impl ProviderPool {
    pub fn new(p: &ProviderParams) -> Self {
        Self {
            permits: Arc::new(Permits {
                available: Mutex::new(p.pool_size),
                freed: Condvar::new(),
            }),
            size: p.pool_size,
            timeout: Duration::from_millis(p.timeout_ms),
            retries: p.fetch_retries,
            backoff_base: Duration::from_millis(p.backoff_base_ms),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Permits not currently held.
    pub fn available(&self) -> usize {
        *self.permits.available.lock()
    }

    fn acquire(&self, provider: &'static str) -> Result<Permit, ProviderError> {
        let deadline = Instant::now() + self.timeout;
        let mut available = self.permits.available.lock();
        while *available == 0 {
            if self.permits.freed.wait_until(&mut available, deadline).timed_out() && *available == 0 {
                return Err(ProviderError::PoolExhausted { provider });
            }
        }
        *available -= 1;
        Ok(Permit {
            permits: Arc::clone(&self.permits),
        })
    }

    /// Run one provider call under the pool's permit and timeout.
    pub fn call<T, F>(&self, provider: &'static str, f: F) -> Result<T, ProviderError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, ProviderError> + Send + 'static,
    {
        let permit = self.acquire(provider)?;
        let (tx, rx) = mpsc::sync_channel(1);
        std::thread::Builder::new()
            .name(format!("{provider}-call"))
            .spawn(move || {
                let result = f();
                drop(permit);
                // The receiver is gone if the caller already timed out.
                let _ = tx.send(result);
            })
            .map_err(|e| ProviderError::Unavailable(format!("could not spawn {provider} worker: {e}")))?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(ProviderError::Timeout {
                provider,
                after_ms: self.timeout.as_millis() as u64,
            }),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(ProviderError::Unavailable(format!(
                "{provider} worker exited without a result"
            ))),
        }
    }

    /// [`call`](Self::call) with retries and exponential backoff on transient
    /// failures. `Malformed` is not retried.
    pub fn fetch<T, F>(&self, provider: &'static str, f: F) -> Result<T, ProviderError>
    where
        T: Send + 'static,
        F: Fn() -> Result<T, ProviderError> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let mut attempt = 0;
        loop {
            let call = Arc::clone(&f);
            match self.call(provider, move || (*call)()) {
                Ok(v) => return Ok(v),
                Err(e) if is_retryable(&e) && attempt < self.retries => {
                    let delay = self.backoff_base * 2u32.saturating_pow(attempt);
                    debug!(provider, attempt, error = %e, ?delay, "provider call failed, backing off");
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => {
                    warn!(provider, attempts = attempt + 1, error = %e, "provider call failed");
                    return Err(e);
                }
            }
        }
    }
}

fn is_retryable(e: &ProviderError) -> bool {
    !matches!(e, ProviderError::Malformed(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    fn pool(size: usize, timeout_ms: u64, retries: u32) -> ProviderPool {
        ProviderPool::new(&ProviderParams {
            pool_size: size,
            timeout_ms,
            fetch_retries: retries,
            backoff_base_ms: 1,
        })
    }

    #[test]
    fn test_call_returns_value_and_releases_permit() {
        let p = pool(2, 1_000, 0);
        assert_eq!(p.call("test", || Ok(41 + 1)).unwrap(), 42);
        // The worker drops its permit before sending the result.
        assert_eq!(p.available(), 2);
    }

    #[test]
    fn test_slow_call_times_out() {
        let p = pool(2, 30, 0);
        let err = p
            .call("terrain", || {
                std::thread::sleep(Duration::from_millis(300));
                Ok(())
            })
            .unwrap_err();
        assert_eq!(
            err,
            ProviderError::Timeout {
                provider: "terrain",
                after_ms: 30
            }
        );
    }

    #[test]
    fn test_hung_call_keeps_its_permit() {
        let p = pool(1, 30, 0);
        let _ = p.call("terrain", || {
            std::thread::sleep(Duration::from_millis(400));
            Ok(())
        });
        let err = p.call("terrain", || Ok(())).unwrap_err();
        assert_eq!(err, ProviderError::PoolExhausted { provider: "terrain" });
    }

    #[test]
    fn test_fetch_retries_transient_failures() {
        let p = pool(2, 1_000, 3);
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let v = p
            .fetch("rainfall", move || {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ProviderError::Unavailable("flaky".into()))
                } else {
                    Ok(7.5)
                }
            })
            .unwrap();
        assert_eq!(v, 7.5);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_fetch_gives_up_after_retries() {
        let p = pool(2, 1_000, 2);
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let err = p
            .fetch("rainfall", move || -> Result<(), ProviderError> {
                c.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::Unavailable("down".into()))
            })
            .unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_malformed_is_not_retried() {
        let p = pool(2, 1_000, 5);
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let _ = p.fetch("neighbors", move || -> Result<(), ProviderError> {
            c.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::Malformed("nan depth".into()))
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_in_flight_calls_bounded_by_pool_size() {
        let p = Arc::new(pool(3, 2_000, 0));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..12)
            .map(|_| {
                let p = Arc::clone(&p);
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                std::thread::spawn(move || {
                    p.call("terrain", move || {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(10));
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    })
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }
}
