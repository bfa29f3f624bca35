//! Bounded status polling

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use super::{JobError, JobStatus};

/// Fixed-interval polling with an attempt ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), 600)
    }
}

/// Call `check` once per interval until `done` accepts the reported status.
///
/// The first check happens one interval after the call. Any error from
/// `check` ends polling immediately; running out of attempts yields
/// [`JobError::PollTimeout`].
pub async fn poll_until<F, Fut, D>(
    policy: PollPolicy,
    job_id: &str,
    mut check: F,
    done: D,
) -> Result<JobStatus, JobError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<JobStatus, JobError>>,
    D: Fn(&JobStatus) -> bool,
{
    for attempt in 1..=policy.max_attempts {
        tokio::time::sleep(policy.interval).await;

        let status = check().await?;
        if done(&status) {
            debug!(job_id, attempt, status = status.as_str(), "Job completed");
            return Ok(status);
        }
        debug!(job_id, attempt, status = status.as_str(), "Job still running");
    }

    Err(JobError::PollTimeout {
        job_id: job_id.to_string(),
        attempts: policy.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_completed() {
        let calls = &AtomicU32::new(0);
        let status = poll_until(
            PollPolicy::default(),
            "job-1",
            move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, JobError>(if n < 2 {
                    JobStatus::Processing
                } else {
                    JobStatus::SummarizerCompleted
                })
            },
            JobStatus::is_completed,
        )
        .await
        .unwrap();

        assert_eq!(status, JobStatus::SummarizerCompleted);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_status_keeps_polling_until_limit() {
        let calls = &AtomicU32::new(0);
        let err = poll_until(
            PollPolicy::new(Duration::from_secs(1), 4),
            "stuck",
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, JobError>(JobStatus::Other("queued".to_string()))
            },
            JobStatus::is_completed,
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            JobError::PollTimeout { ref job_id, attempts: 4 } if job_id == "stuck"
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_error_stops_polling() {
        let calls = &AtomicU32::new(0);
        let err = poll_until(
            PollPolicy::default(),
            "broken",
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<JobStatus, _>(JobError::InvalidResponse("boom".to_string()))
            },
            JobStatus::is_completed,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, JobError::InvalidResponse(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_done_predicate() {
        let status = tokio_test::assert_ok!(
            poll_until(
                PollPolicy::new(Duration::from_secs(5), 3),
                "g1",
                || async { Ok::<_, JobError>(JobStatus::GrammarCompleted) },
                |status| *status == JobStatus::GrammarCompleted,
            )
            .await
        );

        assert_eq!(status, JobStatus::GrammarCompleted);
    }
}
