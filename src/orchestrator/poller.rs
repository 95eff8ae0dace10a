//! Fixed-interval job polling with an attempt ceiling.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::PollingConfig;
use crate::errors::{BotError, BotResult};
use crate::providers::{FaceSwapProvider, JobHandle, JobKind, JobState, JobStatus};

/// Suspends the poll loop between attempts
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub fn for_job(config: &PollingConfig, kind: JobKind) -> Self {
        let max_attempts = match kind {
            JobKind::Image => config.image_max_attempts,
            JobKind::Media => config.media_max_attempts,
        };
        Self {
            interval: config.interval,
            max_attempts,
        }
    }
}

/// Poll `job` until the provider reports a terminal status or the attempt
/// ceiling is hit.
///
/// Each attempt sleeps first, then calls `on_attempt` (an error there aborts
/// the loop), then asks for the status. A failed status request counts as
/// an attempt and is not fatal.
pub async fn poll_job<F, Fut>(
    provider: &dyn FaceSwapProvider,
    job: &JobHandle,
    policy: PollPolicy,
    sleeper: &dyn Sleeper,
    mut on_attempt: F,
) -> BotResult<JobStatus>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = BotResult<()>>,
{
    for attempt in 1..=policy.max_attempts {
        sleeper.sleep(policy.interval).await;
        on_attempt(attempt).await?;

        match provider.get_job_status(job).await {
            Ok(status) => match status.state {
                JobState::Complete => {
                    debug!(job_id = %job.id, attempt, "Job complete");
                    return Ok(status);
                }
                JobState::Error => {
                    warn!(job_id = %job.id, attempt, error = ?status.error_message, "Job failed");
                    return Err(BotError::Provider(status.error_message.unwrap_or_default()));
                }
                JobState::Pending => {
                    debug!(job_id = %job.id, attempt, "Job pending");
                }
            },
            Err(e) => {
                warn!(job_id = %job.id, attempt, error = %e, "Job status request failed");
            }
        }
    }

    Err(BotError::ProviderTimeout {
        attempts: policy.max_attempts,
    })
}
