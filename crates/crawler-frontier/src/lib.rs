//! Two-level Mercator-style URL frontier: a front queue feeds per-host back
//! queues, a politeness heap gates dispatch, and a single scheduler task
//! owns the host<->queue bookkeeping so workers never need to agree on a
//! lock order with each other over it.
//!
//! Workers never learn definitively that a back queue is empty on their
//! own — they only hint it to the scheduler, which is the sole writer of
//! the host<->queue map and is therefore the only task that can confirm or
//! refute the hint without a race.

pub mod approx_set;
pub mod normalize;
pub mod policy;

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, trace};

use approx_set::ApproximateSet;
use policy::PolicyCache;

#[derive(Clone, Copy, Debug)]
struct HeapEntry {
    ready_at: Instant,
    idx: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.ready_at == other.ready_at
    }
}
impl Eq for HeapEntry {}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.ready_at.cmp(&other.ready_at)
    }
}

pub struct FrontierParams {
    pub workers: usize,
    pub filter_capacity: u64,
    pub filter_error: f64,
    pub default_delay: Duration,
    pub heap_timeout: Duration,
    pub policy_cache_size: usize,
    pub robots_timeout: Duration,
}

pub struct Frontier {
    front: Mutex<VecDeque<String>>,
    back: Vec<Mutex<VecDeque<String>>>,
    heap: Mutex<BinaryHeap<Reverse<HeapEntry>>>,
    heap_notify: Notify,
    hinted_empty: Mutex<HashSet<usize>>,
    has_empty_notify: Notify,
    visited: Mutex<ApproximateSet>,
    policy: Arc<PolicyCache>,
    n: usize,
    heap_timeout: Duration,
}

impl Frontier {
    /// Builds the frontier and spawns its dedicated scheduler task. The
    /// returned handle can be aborted to stop the scheduler (e.g. in tests);
    /// it otherwise runs until the process exits.
    pub fn spawn(params: FrontierParams) -> (Arc<Self>, tokio::task::JoinHandle<()>) {
        let n = 3 * params.workers.max(1);
        let policy = Arc::new(PolicyCache::new(
            params.policy_cache_size,
            params.default_delay,
            params.robots_timeout,
        ));
        let frontier = Arc::new(Self {
            front: Mutex::new(VecDeque::new()),
            back: (0..n).map(|_| Mutex::new(VecDeque::new())).collect(),
            heap: Mutex::new(BinaryHeap::new()),
            heap_notify: Notify::new(),
            hinted_empty: Mutex::new(HashSet::new()),
            has_empty_notify: Notify::new(),
            visited: Mutex::new(ApproximateSet::new(params.filter_capacity, params.filter_error)),
            policy,
            n,
            heap_timeout: params.heap_timeout,
        });
        let scheduler = {
            let frontier = Arc::clone(&frontier);
            tokio::spawn(async move { frontier.run_scheduler().await })
        };
        (frontier, scheduler)
    }

    pub fn policy(&self) -> &Arc<PolicyCache> {
        &self.policy
    }

    /// Idempotent: inserts `url` into the front queue iff it hasn't been
    /// seen before. Marks it seen first, so a second `put` racing right
    /// behind the first can never slip past and duplicate the enqueue.
    /// Safe to call from any task, including before the scheduler has
    /// processed anything.
    pub fn put(&self, url: String) {
        {
            let mut visited = self.visited.lock().unwrap();
            if visited.check(&url) {
                return;
            }
            visited.add(&url);
        }
        self.front.lock().unwrap().push_back(url);
    }

    /// Pops a URL honoring per-host politeness, invokes `fetch_fn`, and
    /// returns its result — or `None` if no URL was dispatched this call
    /// (heap timeout, or a back queue turned out to be empty).
    pub async fn get<F, Fut, R>(&self, fetch_fn: F) -> Option<R>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = R>,
    {
        let entry = self.pop_ready_idx().await?;

        let url = {
            let mut q = self.back[entry.idx].lock().unwrap();
            q.pop_front()
        };
        let Some(url) = url else {
            // Empty hint: the scheduler may be mid-push for this idx, so we
            // can't conclude the host is drained — only hint it and let the
            // scheduler confirm.
            self.hinted_empty.lock().unwrap().insert(entry.idx);
            self.has_empty_notify.notify_one();
            return None;
        };

        let now = Instant::now();
        if now < entry.ready_at {
            tokio::time::sleep(entry.ready_at - now).await;
        }

        let result = fetch_fn(url.clone()).await;

        // Runs on every exit path of the fetch: the idx must always return
        // to the heap (or be re-hinted), never silently vanish.
        let delay = self.policy.crawl_delay(&url).await;
        self.heap.lock().unwrap().push(Reverse(HeapEntry {
            ready_at: Instant::now() + delay,
            idx: entry.idx,
        }));
        self.heap_notify.notify_one();

        Some(result)
    }

    async fn pop_ready_idx(&self) -> Option<HeapEntry> {
        let deadline = Instant::now() + self.heap_timeout;
        loop {
            let notified = self.heap_notify.notified();
            if let Some(Reverse(entry)) = self.heap.lock().unwrap().pop() {
                return Some(entry);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep(remaining) => return None,
            }
        }
    }

    /// The dedicated scheduler loop: the sole writer of the host<->back-queue
    /// map and the inactive set, by construction (these live as locals here,
    /// never shared via `Arc`). Each iteration: confirm or refute pending
    /// empty-hints, drain the front queue into back queues while any are
    /// inactive, then wait for more empty-hints (or poll, if every queue is
    /// currently active and nothing will ever set that signal).
    async fn run_scheduler(self: Arc<Self>) {
        let mut domain_to_idx: HashMap<String, usize> = HashMap::new();
        let mut idx_to_domain: Vec<Option<String>> = vec![None; self.n];
        let mut inactive: HashSet<usize> = (0..self.n).collect();

        loop {
            // Step 1+2: drain hinted-empty, confirming or refuting each hint.
            let hinted: Vec<usize> = { self.hinted_empty.lock().unwrap().drain().collect() };
            for idx in hinted {
                let really_empty = self.back[idx].lock().unwrap().is_empty();
                if really_empty {
                    inactive.insert(idx);
                    if let Some(host) = idx_to_domain[idx].take() {
                        domain_to_idx.remove(&host);
                    }
                    trace!(idx, "back queue confirmed empty, deactivated");
                } else if let Some(host) = idx_to_domain[idx].clone() {
                    let delay = self.policy.crawl_delay(&host).await;
                    self.heap.lock().unwrap().push(Reverse(HeapEntry {
                        ready_at: Instant::now() + delay,
                        idx,
                    }));
                    self.heap_notify.notify_one();
                }
            }

            // Step 3: drain front into back queues while any are inactive.
            loop {
                let url = {
                    let mut front = self.front.lock().unwrap();
                    if front.is_empty() || inactive.is_empty() {
                        None
                    } else {
                        front.pop_front()
                    }
                };
                let Some(url) = url else { break };
                let Some(host) = normalize::host_key(&url) else {
                    continue;
                };

                if let Some(&idx) = domain_to_idx.get(&host) {
                    self.back[idx].lock().unwrap().push_back(url);
                    let refuted = self.hinted_empty.lock().unwrap().remove(&idx);
                    if refuted {
                        self.heap.lock().unwrap().push(Reverse(HeapEntry {
                            ready_at: Instant::now(),
                            idx,
                        }));
                        self.heap_notify.notify_one();
                    }
                } else {
                    let idx = match inactive.iter().next().copied() {
                        Some(idx) => idx,
                        None => break,
                    };
                    inactive.remove(&idx);
                    domain_to_idx.insert(host.clone(), idx);
                    idx_to_domain[idx] = Some(host.clone());
                    self.back[idx].lock().unwrap().push_back(url);
                    // A freshly activated queue's first dispatch is immediate;
                    // politeness only spaces *subsequent* fetches to this
                    // host (applied when `get` re-arms the heap after a
                    // fetch completes).
                    self.heap.lock().unwrap().push(Reverse(HeapEntry {
                        ready_at: Instant::now(),
                        idx,
                    }));
                    self.heap_notify.notify_one();
                    debug!(host, idx, "assigned new back queue");
                }
            }

            // Step 4: nothing will ever set has-empty if every queue is
            // inactive, so poll instead of waiting forever.
            if inactive.len() == self.n {
                tokio::time::sleep(Duration::from_millis(100)).await;
            } else {
                self.has_empty_notify.notified().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    fn test_params(workers: usize, default_delay_ms: u64) -> FrontierParams {
        FrontierParams {
            workers,
            filter_capacity: 10_000,
            filter_error: 0.01,
            default_delay: StdDuration::from_millis(default_delay_ms),
            heap_timeout: StdDuration::from_millis(500),
            policy_cache_size: 100,
            robots_timeout: StdDuration::from_millis(50),
        }
    }

    /// S3: dedup — putting the same URL twice dispatches it exactly once.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn dedup_dispatches_once() {
        let (frontier, scheduler) = Frontier::spawn(test_params(2, 10));
        frontier.put("http://h/x".to_string());
        frontier.put("http://h/x".to_string());

        let dispatched = Arc::new(AtomicUsize::new(0));
        let d = Arc::clone(&dispatched);
        let got = frontier
            .get(|url| async move {
                d.fetch_add(1, Ordering::SeqCst);
                url
            })
            .await;
        assert!(got.is_some());

        // Second get should time out quickly: nothing else was enqueued.
        let second = tokio::time::timeout(StdDuration::from_millis(200), frontier.get(|url| async move { url })).await;
        assert!(second.is_err() || second.unwrap().is_none());
        assert_eq!(dispatched.load(Ordering::SeqCst), 1);
        scheduler.abort();
    }

    /// S2: per-host isolation — two different hosts dispatch close together.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn different_hosts_dispatch_concurrently() {
        let (frontier, scheduler) = Frontier::spawn(test_params(2, 1000));
        frontier.put("http://a/1".to_string());
        frontier.put("http://b/1".to_string());

        let f1 = Arc::clone(&frontier);
        let f2 = Arc::clone(&frontier);
        let start = Instant::now();
        let (r1, r2) = tokio::join!(
            f1.get(|url| async move { url }),
            f2.get(|url| async move { url }),
        );
        assert!(r1.is_some() && r2.is_some());
        assert!(start.elapsed() < StdDuration::from_millis(200));
        scheduler.abort();
    }

    /// S1: politeness — same-host URLs are spaced by at least the delay.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn same_host_respects_politeness_delay() {
        let (frontier, scheduler) = Frontier::spawn(test_params(2, 300));
        frontier.put("http://h/a".to_string());
        frontier.put("http://h/b".to_string());

        let first = frontier.get(|url| async move { (url, Instant::now()) }).await.unwrap();
        let second = frontier.get(|url| async move { (url, Instant::now()) }).await.unwrap();
        assert!(second.1.duration_since(first.1) >= StdDuration::from_millis(290));
        scheduler.abort();
    }

    #[tokio::test]
    async fn get_times_out_when_nothing_enqueued() {
        let mut params = test_params(1, 10);
        params.heap_timeout = StdDuration::from_millis(50);
        let (frontier, scheduler) = Frontier::spawn(params);
        let result = frontier.get(|url| async move { url }).await;
        assert!(result.is_none());
        scheduler.abort();
    }
}
