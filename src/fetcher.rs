use std::{future::Future, sync::Arc};

use tokio::sync::Semaphore;

use crate::error::{Error, Result};

pub const DEFAULT_CONCURRENCY: usize = 6;

/// Bounds how many content retrievals run at once.
///
/// Requests past the limit wait in FIFO order; any in-flight request
/// finishing, successfully or not, lets the next one start. A request still
/// waiting for a slot is cancelled by dropping its future. Once started it
/// runs to completion on its own task, even if the caller stops waiting.
#[derive(Debug, Clone)]
pub struct ThrottledFetcher {
    permits: Arc<Semaphore>,
    concurrency: usize,
}

impl ThrottledFetcher {
    /// A concurrency of zero is treated as one.
    pub fn new(concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            permits: Arc::new(Semaphore::new(concurrency)),
            concurrency,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Requests currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.concurrency - self.permits.available_permits()
    }

    /// Run `request` once a slot is free and return its result.
    pub async fn fetch<F, T>(&self, request: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| Error::FetchTask(e.to_string()))?;

        let task = tokio::spawn(async move {
            let _permit = permit;
            request.await
        });

        task.await.map_err(|e| Error::FetchTask(e.to_string()))?
    }
}

impl Default for ThrottledFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use futures::future::join_all;

    use super::*;

    #[tokio::test]
    async fn never_exceeds_concurrency() {
        let fetcher = ThrottledFetcher::new(6);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let requests = (0..10).map(|i| {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            fetcher.fetch(async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                if i % 3 == 0 {
                    Err(Error::fetch(&format!("/{i}"), "boom"))
                } else {
                    Ok(i)
                }
            })
        });

        let results = join_all(requests).await;
        assert_eq!(results.len(), 10);
        assert_eq!(results.iter().filter(|r| r.is_err()).count(), 4);
        assert!(peak.load(Ordering::SeqCst) <= 6);
        assert_eq!(fetcher.in_flight(), 0);
    }

    #[tokio::test]
    async fn queued_requests_start_in_order() {
        let fetcher = ThrottledFetcher::new(1);
        let started = Arc::new(Mutex::new(Vec::new()));

        let requests = (0..5).map(|i| {
            let started = Arc::clone(&started);
            fetcher.fetch(async move {
                started.lock().unwrap().push(i);
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(i)
            })
        });
        join_all(requests).await;

        assert_eq!(*started.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn failure_releases_slot() {
        let fetcher = ThrottledFetcher::new(1);
        let failed: Result<()> =
            fetcher.fetch(async { Err(Error::fetch("/a", "down")) }).await;
        assert!(failed.unwrap_err().is_fetch());

        let ok = fetcher.fetch(async { Ok(7) }).await.unwrap();
        assert_eq!(ok, 7);
    }

    #[tokio::test]
    async fn dropped_queued_request_never_runs() {
        let fetcher = ThrottledFetcher::new(1);
        let ran = Arc::new(AtomicUsize::new(0));

        let blocker = {
            let fetcher = fetcher.clone();
            tokio::spawn(async move {
                fetcher
                    .fetch(async {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(())
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(fetcher.in_flight(), 1);

        let queued = {
            let ran = Arc::clone(&ran);
            fetcher.fetch(async move {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        };
        let timed_out =
            tokio::time::timeout(Duration::from_millis(5), queued).await;
        assert!(timed_out.is_err());

        blocker.await.unwrap().unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(fetcher.in_flight(), 0);
    }

    #[tokio::test]
    async fn zero_concurrency_is_clamped() {
        let fetcher = ThrottledFetcher::new(0);
        assert_eq!(fetcher.concurrency(), 1);
        assert_eq!(fetcher.fetch(async { Ok("done") }).await.unwrap(), "done");
    }
}
