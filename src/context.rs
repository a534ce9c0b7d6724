use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a context stopped the work it was guarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    DeadlineExceeded,
    Cancelled,
}

/// Deadline and cancellation scope handed to collectors for one scrape.
///
/// Narrowing a context with [`ScrapeContext::with_timeout`] keeps the parent's
/// deadline when it is earlier and links the child to the parent's
/// cancellation token, so cancelling the caller aborts every in-flight query
/// derived from it.
#[derive(Debug, Clone)]
pub struct ScrapeContext {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl ScrapeContext {
    /// A context without deadline that is only cancelled explicitly.
    pub fn background() -> Self {
        Self {
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(parent) if parent < deadline => parent,
            _ => deadline,
        };

        Self {
            deadline: Some(deadline),
            cancel: self.cancel.child_token(),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Reports whether the context is already done, without waiting.
    pub fn check(&self) -> Result<(), Interrupt> {
        if self.cancel.is_cancelled() {
            return Err(Interrupt::Cancelled);
        }

        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Interrupt::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Drives `fut` until it completes or the context is done, whichever
    /// happens first. On interruption the future is dropped.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, Interrupt>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Interrupt::Cancelled),
            _ = expired(self.deadline) => Err(Interrupt::DeadlineExceeded),
            output = fut => Ok(output),
        }
    }
}

impl Default for ScrapeContext {
    fn default() -> Self {
        Self::background()
    }
}

async fn expired(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_child_keeps_earlier_parent_deadline() {
        let parent = ScrapeContext::background().with_timeout(Duration::from_millis(200));
        let child = parent.with_timeout(Duration::from_secs(1));

        assert_eq!(parent.deadline(), child.deadline());
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_narrows_later_parent_deadline() {
        let parent = ScrapeContext::background().with_timeout(Duration::from_secs(10));
        let child = parent.with_timeout(Duration::from_secs(1));

        assert!(child.deadline() < parent.deadline());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_times_out() {
        let ctx = ScrapeContext::background().with_timeout(Duration::from_secs(1));
        let result = ctx
            .run(tokio::time::sleep(Duration::from_secs(5)))
            .await;

        assert_eq!(Err(Interrupt::DeadlineExceeded), result);
        assert_eq!(Err(Interrupt::DeadlineExceeded), ctx.check());
    }

    #[tokio::test]
    async fn test_run_completes_within_deadline() {
        let ctx = ScrapeContext::background().with_timeout(Duration::from_secs(5));
        let result = ctx.run(async { 42 }).await;

        assert_eq!(Ok(42), result);
        assert_eq!(Ok(()), ctx.check());
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancellation_reaches_child() {
        let parent = ScrapeContext::background();
        let child = parent.with_timeout(Duration::from_secs(60));

        parent.cancel();

        let result = child.run(std::future::pending::<()>()).await;
        assert_eq!(Err(Interrupt::Cancelled), result);
    }

    #[tokio::test]
    async fn test_child_cancellation_does_not_reach_parent() {
        let parent = ScrapeContext::background();
        let child = parent.with_timeout(Duration::from_secs(60));

        child.cancel();

        assert_eq!(Err(Interrupt::Cancelled), child.check());
        assert_eq!(Ok(()), parent.check());
    }
}
