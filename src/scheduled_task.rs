use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use rocket::tokio::{
    self,
    task::{JoinError, JoinHandle},
    time::Duration,
};

/// A task that runs at a given point in time unless aborted first.
pub struct ScheduledTask<T> {
    handle: JoinHandle<T>,
}

impl<T> ScheduledTask<T>
where
    T: Send + 'static,
{
    /// Schedule `task` to execute at `run_at`, or immediately if that has passed.
    pub fn new<Fut>(task: Fut, run_at: DateTime<Utc>) -> Self
    where
        Fut: Future<Output = T> + Send + 'static,
    {
        let delay = datetime_to_duration(run_at);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await
        });
        Self { handle }
    }

    /// Stop the task without waiting for it to wind down.
    /// A task that is mid-execution stops at its next suspension point.
    pub fn abort(&self) {
        self.handle.abort();
    }
}

impl<T> Future for ScheduledTask<T> {
    type Output = Result<T, JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx)
    }
}

/// Time from now until `datetime`, or zero if it is in the past.
fn datetime_to_duration(datetime: DateTime<Utc>) -> Duration {
    let millis = (datetime - Utc::now()).num_milliseconds();
    Duration::from_millis(u64::try_from(millis).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    #[test]
    fn past_datetimes_are_immediate() {
        let past = Utc::now() - chrono::Duration::seconds(30);
        assert_eq!(datetime_to_duration(past), Duration::ZERO);
        let future = Utc::now() + chrono::Duration::seconds(30);
        assert!(datetime_to_duration(future) > Duration::from_secs(25));
    }

    #[rocket::async_test]
    async fn runs_at_scheduled_time() {
        let run_at = Utc::now() + chrono::Duration::milliseconds(50);
        let task = ScheduledTask::new(async { Utc::now() }, run_at);
        let ran_at = task.await.unwrap();
        assert!(ran_at >= run_at);
    }

    #[rocket::async_test]
    async fn aborted_task_never_runs() {
        let ran = Arc::new(AtomicBool::new(false));
        let task_ran = ran.clone();
        let task = ScheduledTask::new(
            async move { task_ran.store(true, Ordering::SeqCst) },
            Utc::now() + chrono::Duration::milliseconds(50),
        );
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!ran.load(Ordering::SeqCst));
    }
}
