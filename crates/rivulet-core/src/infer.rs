//! Resilient invocation of model forward passes
//!
//! Some quantized execution paths fail transiently; a bounded retry with a
//! fixed delay absorbs those failures instead of surfacing them to the
//! stream consumer. Exhausting the budget propagates a fatal inference
//! error.

use std::time::Duration;

use tracing::warn;

use crate::{CoreError, Result};

/// Total attempts per forward-pass call
pub const MAX_ATTEMPTS: usize = 5;

/// Fixed delay between attempts
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Run `op` with the standard retry policy.
///
/// `what` names the operation in logs and in the final error. The closure is
/// invoked up to [`MAX_ATTEMPTS`] times with [`RETRY_DELAY`] between
/// attempts; the last error is returned as [`CoreError::Inference`].
pub fn with_retry<T, F>(what: &str, op: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    retry_with_delay(what, RETRY_DELAY, op)
}

pub(crate) fn retry_with_delay<T, F>(what: &str, delay: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if attempt < MAX_ATTEMPTS => {
                warn!(attempt, error = %err, "{what} failed, retrying");
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(err) => {
                return Err(CoreError::inference(
                    "INFER_RETRIES_EXHAUSTED",
                    err.to_string(),
                    format!("{what} kept failing"),
                    "Check the model backend; transient failures beyond the retry budget usually indicate a persistent fault",
                    MAX_ATTEMPTS,
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_succeeds_first_attempt() {
        let mut calls = 0;
        let result = retry_with_delay("op", Duration::ZERO, || {
            calls += 1;
            Ok(7)
        });
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_recovers_from_transient_failures() {
        let mut calls = 0;
        let result = retry_with_delay("op", Duration::ZERO, || {
            calls += 1;
            if calls < 3 {
                Err(CoreError::generation("FLAKY", "boom", "test", "none"))
            } else {
                Ok("ok")
            }
        });
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_exhausts_retry_budget() {
        let mut calls = 0;
        let result: Result<()> = retry_with_delay("op", Duration::ZERO, || {
            calls += 1;
            Err(CoreError::generation("FLAKY", "boom", "test", "none"))
        });

        assert_eq!(calls, MAX_ATTEMPTS);
        match result.unwrap_err() {
            CoreError::Inference { attempts, .. } => assert_eq!(attempts, MAX_ATTEMPTS),
            other => panic!("expected inference error, got {other:?}"),
        }
    }
}
