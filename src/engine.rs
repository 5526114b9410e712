//! Transaction engine
//!
//! One transaction is a write of the request frame followed by a read of the
//! response, repeated from scratch when either half times out. Every attempt
//! is preceded by the controller turnaround delay. Any non-timeout failure
//! aborts immediately.
//!
//! The engine does not lock anything itself; callers hold the port lock for
//! the whole call (see [`LovePort`](crate::port::LovePort)).

use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::config::PortConfig;
use crate::constants::MAX_RESPONSE_SIZE;
use crate::error::{LoveError, LoveResult};
use crate::transport::{EomReason, LoveTransport};

// ============================================================================
// Delay
// ============================================================================

/// Sleep used for the inter-command delay
pub trait Delay: Send + Sync {
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;
}

/// Real delay on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioDelay;

impl Delay for TokioDelay {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Skips every delay
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl Delay for NoDelay {
    async fn sleep(&self, _duration: Duration) {}
}

// ============================================================================
// Retry Policy
// ============================================================================

/// Attempt budget and timing for one transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub timeout: Duration,
    pub inter_command_delay: Duration,
    pub max_response: usize,
}

impl RetryPolicy {
    pub fn from_config(config: &PortConfig) -> Self {
        Self {
            attempts: config.retries.max(1),
            timeout: config.timeout(),
            inter_command_delay: config.inter_command_delay(),
            max_response: MAX_RESPONSE_SIZE,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&PortConfig::default())
    }
}

// ============================================================================
// Execute
// ============================================================================

/// Run one write/read exchange with retry on timeout
///
/// Returns the raw response bytes as delivered by the transport.
pub async fn execute<T, D>(
    transport: &mut T,
    delay: &D,
    policy: &RetryPolicy,
    request: &[u8],
) -> LoveResult<Bytes>
where
    T: LoveTransport,
    D: Delay,
{
    for attempt in 1..=policy.attempts {
        delay.sleep(policy.inter_command_delay).await;

        match transport.write(request, policy.timeout).await {
            Ok(_) => {}
            Err(e) if e.is_retryable() => {
                warn!("write timeout, retrying (attempt {}/{})", attempt, policy.attempts);
                continue;
            }
            Err(e) => {
                warn!("write failure: {}", e);
                return Err(e);
            }
        }

        match transport.read(policy.max_response, policy.timeout).await {
            Ok(outcome) => {
                return match outcome.eom {
                    EomReason::Eos => {
                        debug!("response after {} attempt(s): {} bytes", attempt, outcome.data.len());
                        Ok(outcome.data)
                    }
                    EomReason::Count => Err(LoveError::overflow(format!(
                        "{} bytes read without end-of-message",
                        outcome.data.len()
                    ))),
                    EomReason::End => Err(LoveError::transport(
                        "read ended without end-of-message marker",
                    )),
                };
            }
            Err(e) if e.is_retryable() => {
                warn!("read timeout, retrying (attempt {}/{})", attempt, policy.attempts);
                continue;
            }
            Err(e) => {
                warn!("read failure: {}", e);
                return Err(e);
            }
        }
    }

    warn!("retries exceeded after {} attempts", policy.attempts);
    Err(LoveError::timeout(
        format!("transaction ({} attempts)", policy.attempts),
        policy.timeout.as_millis() as u64,
    ))
}
