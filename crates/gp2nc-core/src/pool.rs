use std::sync::Arc;
use std::thread::{Scope, ScopedJoinHandle};

use crossbeam_channel::{unbounded, Sender};
use tracing::error;

/// Fixed number of scoped worker threads draining one shared job queue.
///
/// Results leave the pool through whatever the handler captures (usually a
/// channel sender). The handler is dropped once the last worker exits, so a
/// receiver on such a channel sees it close exactly when every job is done.
pub struct WorkerPool<'scope, J> {
    queue: Sender<J>,
    workers: Vec<ScopedJoinHandle<'scope, ()>>,
}

impl<'scope, J: Send + 'scope> WorkerPool<'scope, J> {
    /// Start `size` workers (at least one) inside `scope`.
    pub fn spawn<'env, F>(scope: &'scope Scope<'scope, 'env>, size: usize, handler: F) -> Self
    where
        F: Fn(J) + Send + Sync + 'scope,
    {
        let (queue, jobs) = unbounded::<J>();
        let handler = Arc::new(handler);

        let workers = (0..size.max(1))
            .map(|_| {
                let jobs = jobs.clone();
                let handler = Arc::clone(&handler);
                scope.spawn(move || {
                    for job in jobs.iter() {
                        handler(job);
                    }
                })
            })
            .collect();

        Self { queue, workers }
    }

    pub fn submit(&self, job: J) {
        // Only fails when every worker has already panicked; join() reports that.
        let _ = self.queue.send(job);
    }

    /// Close the queue and wait until every submitted job has been handled.
    /// Returns the number of workers that panicked.
    pub fn join(self) -> usize {
        drop(self.queue);
        let panicked = self
            .workers
            .into_iter()
            .map(|worker| worker.join())
            .filter(Result::is_err)
            .count();
        if panicked > 0 {
            error!(panicked, "worker threads panicked");
        }
        panicked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_all_jobs_handled_before_join_returns() {
        let handled = AtomicUsize::new(0);
        thread::scope(|s| {
            let pool = WorkerPool::spawn(s, 4, |n: usize| {
                handled.fetch_add(n, Ordering::SeqCst);
            });
            for n in 1..=100 {
                pool.submit(n);
            }
            assert_eq!(pool.join(), 0);
            assert_eq!(handled.load(Ordering::SeqCst), 5050);
        });
    }

    #[test]
    fn test_concurrency_is_bounded() {
        let running = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        thread::scope(|s| {
            let pool = WorkerPool::spawn(s, 3, |_: u32| {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(5));
                running.fetch_sub(1, Ordering::SeqCst);
            });
            for job in 0..30 {
                pool.submit(job);
            }
            pool.join();
        });
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn test_zero_size_still_makes_progress() {
        let handled = AtomicUsize::new(0);
        thread::scope(|s| {
            let pool = WorkerPool::spawn(s, 0, |_: ()| {
                handled.fetch_add(1, Ordering::SeqCst);
            });
            pool.submit(());
            pool.submit(());
            pool.join();
        });
        assert_eq!(handled.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_results_channel_closes_after_workers_finish() {
        let (tx, rx) = crossbeam_channel::bounded::<usize>(1);
        let total = thread::scope(|s| {
            let pool = WorkerPool::spawn(s, 2, move |n: usize| {
                tx.send(n * 2).unwrap();
            });
            for n in 0..10 {
                pool.submit(n);
            }
            let joiner = s.spawn(move || pool.join());
            let total: usize = rx.iter().sum();
            assert_eq!(joiner.join().unwrap(), 0);
            total
        });
        assert_eq!(total, 90);
    }
}
