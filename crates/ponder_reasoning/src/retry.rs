//! Retry logic with exponential backoff at the provider boundary.
//!
//! Retries on transient errors (timeouts, 408/429 and 5xx responses).
//! Does NOT retry on authentication failures, unknown providers or
//! malformed requests.

use ponder_core::config::RetryConfig;
use ponder_core::ProviderError;
use reqwest::StatusCode;
use std::time::Duration;

/// Map a non-success HTTP response to the provider error taxonomy.
pub fn classify_status(provider_name: &str, status: StatusCode, body: &str) -> ProviderError {
    let body = body.chars().take(500).collect::<String>();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return ProviderError::Authentication(format!(
            "{} rejected credentials: {}",
            provider_name, body
        ));
    }
    ProviderError::Backend {
        status: Some(status.as_u16()),
        message: format!("{} API error: {}", provider_name, body),
    }
}

/// Map a transport-level failure (connect, DNS, body decode) to a provider error.
pub fn classify_transport(provider_name: &str, err: reqwest::Error) -> ProviderError {
    ProviderError::Backend {
        status: err.status().map(|s| s.as_u16()),
        message: format!("{} request failed: {}", provider_name, err),
    }
}

/// Execute an async provider operation with retry logic.
///
/// The `operation` closure is called repeatedly until it succeeds, returns a
/// non-retryable error, or `max_attempts` is exhausted. Returns the
/// successful value, or the last error if all attempts failed.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    provider_name: &str,
    mut operation: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, ProviderError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut delay = config.initial_delay();

    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!("{} succeeded on attempt {}", provider_name, attempt);
                }
                return Ok(value);
            }
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) if attempt >= max_attempts => {
                tracing::warn!(
                    "{} giving up after {} attempt(s): {}",
                    provider_name,
                    attempt,
                    e
                );
                return Err(e);
            }
            Err(e) => {
                let sleep_time = delay + Duration::from_millis(rand_jitter());
                tracing::warn!(
                    "{} {} on attempt {}/{}, retrying in {:.1}s",
                    provider_name,
                    e,
                    attempt,
                    max_attempts,
                    sleep_time.as_secs_f64()
                );
                tokio::time::sleep(sleep_time).await;

                // Backoff never shrinks; bad factors from config fall back to the cap.
                let next = delay.as_secs_f64() * config.backoff_factor.max(1.0);
                delay = Duration::try_from_secs_f64(next)
                    .unwrap_or(config.max_delay())
                    .min(config.max_delay());
                attempt += 1;
            }
        }
    }
}

/// Simple jitter: random 0-250ms using timestamp as poor-man's random.
fn rand_jitter() -> u64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 250) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay_ms: 10,
            max_delay_ms: 50,
            backoff_factor: 2.0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_timeout_once_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast_config(2), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(ProviderError::Timeout {
                        after: Duration::from_secs(1),
                    })
                } else {
                    Ok("ok")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&fast_config(3), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(ProviderError::Backend {
                    status: Some(503),
                    message: "down".into(),
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&fast_config(5), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::Authentication("bad key".into())) }
        })
        .await;
        assert!(matches!(result, Err(ProviderError::Authentication(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_negative_backoff_factor_does_not_panic() {
        let config = RetryConfig {
            backoff_factor: -1.0,
            ..fast_config(3)
        };
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&config, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(ProviderError::Backend {
                    status: Some(503),
                    message: "down".into(),
                })
            }
        })
        .await;
        assert!(matches!(result, Err(ProviderError::Backend { status: Some(503), .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_backoff_factor_is_capped() {
        let config = RetryConfig {
            backoff_factor: f64::INFINITY,
            ..fast_config(3)
        };
        let start = tokio::time::Instant::now();
        let result: Result<(), _> = with_retry(&config, "test", || async {
            Err(ProviderError::Timeout {
                after: Duration::from_secs(1),
            })
        })
        .await;
        assert!(result.is_err());
        // 10ms + 50ms of backoff plus at most 250ms jitter per retry.
        assert!(start.elapsed() < Duration::from_millis(600));
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify_status("openai", StatusCode::UNAUTHORIZED, "nope"),
            ProviderError::Authentication(_)
        ));
        match classify_status("gemini", StatusCode::TOO_MANY_REQUESTS, "slow down") {
            ProviderError::Backend { status, message } => {
                assert_eq!(status, Some(429));
                assert!(message.contains("slow down"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
