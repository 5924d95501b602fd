//! 有界 worker 池任务队列
//!
//! 任务按 FIFO 顺序排队，worker 按需创建（不超过上限）、跨任务复用、空闲超时后回收。
//! 具体如何创建 worker、如何执行任务由 [`WorkerPolicy`] 决定。

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::entry::{QueueEntry, Reply, WorkerRecord};
use crate::error::PoolError;

/// worker 池策略
///
/// 池本身只负责调度，worker 是什么、任务怎么执行全部由策略提供。
#[async_trait]
pub trait WorkerPolicy: Send + Sync + Sized + 'static {
    /// 任务参数
    type Args: Send + Sync + 'static;
    /// 任务结果
    type Output: Send + 'static;
    /// worker 句柄
    type Worker: Clone + Send + Sync + 'static;
    /// 断点处交给 [`WorkerPolicy::should_prioritize`] 的信息
    type Breakpoint: Send + 'static;

    /// 创建新的 worker
    ///
    /// 失败时任务会放回队列头部，池内部不会重试创建。
    async fn spawn_worker(&self) -> anyhow::Result<Self::Worker>;

    /// 用指定 worker 执行一个任务
    ///
    /// 返回错误时任务放回队列头部并重新调度，池本身不限制重试次数。
    async fn perform_work(
        &self,
        worker: &Self::Worker,
        args: &Self::Args,
        breakpoints: &Breakpoints<'_, Self>,
    ) -> anyhow::Result<Self::Output>;

    /// worker 空闲超时被回收时调用
    async fn on_worker_expired(&self, _worker: Self::Worker) {}

    /// 断点处是否让队列中的下一个任务插队
    fn should_prioritize(&self, _next: &Self::Args, _breakpoint: &Self::Breakpoint) -> bool {
        false
    }
}

/// 池配置
#[derive(Clone, Debug)]
pub struct PoolOptions {
    /// worker 数量上限
    pub max_workers: usize,
    /// worker 空闲多久后被回收
    pub worker_expires_after: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_workers: 1,
            worker_expires_after: Duration::from_secs(120),
        }
    }
}

/// 池状态快照
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// 等待中的任务数
    pub backlog: usize,
    /// 现有 worker 数
    pub workers: usize,
    /// 正在执行任务的 worker 数
    pub busy: usize,
    /// 正在创建中的 worker 数
    pub spawning: usize,
}

struct PoolState<A, R, W> {
    backlog: VecDeque<QueueEntry<A, R>>,
    workers: Vec<WorkerRecord<W>>,
    spawning: usize,
    next_worker_id: u64,
}

struct PoolInner<P: WorkerPolicy> {
    policy: P,
    options: PoolOptions,
    state: Mutex<PoolState<P::Args, P::Output, P::Worker>>,
}

enum Dispatch<A, R, W> {
    Run {
        worker_id: u64,
        worker: W,
        entry: QueueEntry<A, R>,
    },
    Spawn {
        entry: QueueEntry<A, R>,
    },
}

/// 有界 worker 池
///
/// 克隆得到的是同一个池的句柄。
pub struct WorkerPool<P: WorkerPolicy> {
    inner: Arc<PoolInner<P>>,
}

impl<P: WorkerPolicy> Clone for WorkerPool<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: WorkerPolicy> WorkerPool<P> {
    pub fn new(policy: P, options: PoolOptions) -> Self {
        let options = PoolOptions {
            max_workers: options.max_workers.max(1),
            ..options
        };
        Self {
            inner: Arc::new(PoolInner {
                policy,
                options,
                state: Mutex::new(PoolState {
                    backlog: VecDeque::new(),
                    workers: Vec::new(),
                    spawning: 0,
                    next_worker_id: 0,
                }),
            }),
        }
    }

    pub fn policy(&self) -> &P {
        &self.inner.policy
    }

    /// 提交任务，返回等待结果的 future
    ///
    /// 任务在调用时立即入队，不需要等到 future 被 poll。必须在 tokio 运行时中调用。
    pub fn push(
        &self,
        args: P::Args,
    ) -> impl Future<Output = Result<P::Output, PoolError>> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        self.inner.enqueue(args, Reply::Channel(tx));
        async move { rx.await.map_err(|_| PoolError::ResultDropped) }
    }

    /// 提交任务，结果通过回调送达
    pub fn push_with<F>(&self, args: P::Args, callback: F)
    where
        F: FnOnce(P::Output) + Send + 'static,
    {
        self.inner.enqueue(args, Reply::Callback(Box::new(callback)));
    }

    /// 等待中的任务数（不含正在执行的任务）
    pub fn size(&self) -> usize {
        self.inner.state.lock().backlog.len()
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats {
            backlog: state.backlog.len(),
            workers: state.workers.len(),
            busy: state.workers.iter().filter(|r| r.is_busy).count(),
            spawning: state.spawning,
        }
    }
}

impl<P: WorkerPolicy> PoolInner<P> {
    fn enqueue(self: &Arc<Self>, args: P::Args, reply: Reply<P::Output>) {
        self.state.lock().backlog.push_back(QueueEntry {
            args,
            reply,
            enqueued_at: Instant::now(),
        });
        self.tick();
    }

    /// 把队列中的任务分配给空闲 worker，必要时创建新 worker
    ///
    /// 任务在交给 worker 之前就已出队，重入的 tick 不会重复派发同一个任务。
    fn tick(self: &Arc<Self>) {
        loop {
            let dispatch = {
                let mut state = self.state.lock();
                let idle = state.workers.iter().position(|r| !r.is_busy);

                if idle.is_none() && state.workers.len() + state.spawning >= self.options.max_workers {
                    return;
                }

                let Some(entry) = state.backlog.pop_front() else {
                    return;
                };

                match idle {
                    Some(index) => {
                        let record = &mut state.workers[index];
                        record.is_busy = true;
                        record.clear_expiry();
                        Dispatch::Run {
                            worker_id: record.id,
                            worker: record.worker.clone(),
                            entry,
                        }
                    }
                    None => {
                        state.spawning += 1;
                        Dispatch::Spawn { entry }
                    }
                }
            };

            let pool = Arc::clone(self);
            tokio::spawn(async move {
                match dispatch {
                    Dispatch::Run {
                        worker_id,
                        worker,
                        entry,
                    } => pool.run(worker_id, worker, entry).await,
                    Dispatch::Spawn { entry } => pool.spawn_and_run(entry).await,
                }
            });
        }
    }

    async fn spawn_and_run(self: Arc<Self>, entry: QueueEntry<P::Args, P::Output>) {
        match self.policy.spawn_worker().await {
            Ok(worker) => {
                let worker_id = {
                    let mut state = self.state.lock();
                    state.spawning -= 1;
                    let id = state.next_worker_id;
                    state.next_worker_id += 1;
                    state.workers.push(WorkerRecord::new(id, worker.clone()));
                    id
                };
                info!(worker_id, "🚀 新 worker 已就绪");
                self.run(worker_id, worker, entry).await;
            }
            Err(e) => {
                error!("❌ 创建 worker 失败，任务放回队列: {:#}", e);
                let mut state = self.state.lock();
                state.spawning -= 1;
                state.backlog.push_front(entry);
            }
        }
    }

    async fn run(self: Arc<Self>, worker_id: u64, worker: P::Worker, entry: QueueEntry<P::Args, P::Output>) {
        debug!(worker_id, waited = ?entry.enqueued_at.elapsed(), "开始执行任务");

        let breakpoints = Breakpoints { pool: Some(&*self) };
        let outcome = self
            .policy
            .perform_work(&worker, &entry.args, &breakpoints)
            .await;

        match outcome {
            Ok(result) => {
                entry.reply.send(result);
                self.release(worker_id);
            }
            Err(e) => {
                warn!(worker_id, "⚠️ 任务执行失败，放回队列重试: {:#}", e);
                self.state.lock().backlog.push_front(entry);
                self.release(worker_id);
            }
        }

        self.tick();
    }

    /// 标记 worker 空闲并重新开始空闲计时
    fn release(self: &Arc<Self>, worker_id: u64) {
        let mut state = self.state.lock();
        let Some(record) = state.workers.iter_mut().find(|r| r.id == worker_id) else {
            return;
        };

        record.is_busy = false;
        record.clear_expiry();

        let generation = record.expiry_generation;
        let ttl = self.options.worker_expires_after;
        let pool = Arc::downgrade(self);
        record.expiry = Some(tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Some(pool) = pool.upgrade() {
                pool.expire(worker_id, generation).await;
            }
        }));
    }

    async fn expire(&self, worker_id: u64, generation: u64) {
        let worker = {
            let mut state = self.state.lock();
            let Some(index) = state
                .workers
                .iter()
                .position(|r| r.id == worker_id && !r.is_busy && r.expiry_generation == generation)
            else {
                return;
            };
            state.workers.remove(index).worker
        };

        info!(worker_id, "♻️ worker 空闲超时，已回收");
        self.policy.on_worker_expired(worker).await;
    }
}

/// 任务执行中的让出点
///
/// 策略在任务的每个子步骤之间调用 [`Breakpoints::offer`]，让队列头部的任务有机会插队。
pub struct Breakpoints<'a, P: WorkerPolicy> {
    pool: Option<&'a PoolInner<P>>,
}

impl<P: WorkerPolicy> Breakpoints<'_, P> {
    /// 不允许插队的断点，插队执行的任务内部使用
    pub fn disabled() -> Self {
        Self { pool: None }
    }

    /// 查看队列头部任务，策略同意时立即用当前 worker 执行它
    ///
    /// 只插队一层：插队任务自身的断点不会再让出。插队任务失败时放回队列头部。
    pub async fn offer(&self, worker: &P::Worker, breakpoint: P::Breakpoint) {
        let Some(pool) = self.pool else {
            return;
        };

        let next = {
            let mut state = pool.state.lock();
            match state.backlog.front() {
                Some(next) if pool.policy.should_prioritize(&next.args, &breakpoint) => {
                    state.backlog.pop_front()
                }
                _ => None,
            }
        };
        let Some(entry) = next else {
            return;
        };

        debug!("⏩ 较短的任务插队执行");
        let outcome = pool
            .policy
            .perform_work(worker, &entry.args, &Breakpoints::disabled())
            .await;

        match outcome {
            Ok(result) => entry.reply.send(result),
            Err(e) => {
                warn!("⚠️ 插队任务执行失败，放回队列: {:#}", e);
                pool.state.lock().backlog.push_front(entry);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// 测试用策略：每个参数项耗时 `step`，每项之后调用断点
    #[derive(Default)]
    struct TestPolicy {
        spawned: AtomicUsize,
        expired: AtomicUsize,
        fail_spawn: bool,
        failures_left: AtomicUsize,
        hang: bool,
        step: Duration,
        log: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl WorkerPolicy for TestPolicy {
        type Args = Vec<String>;
        type Output = Vec<String>;
        type Worker = usize;
        type Breakpoint = usize;

        async fn spawn_worker(&self) -> anyhow::Result<usize> {
            if self.fail_spawn {
                anyhow::bail!("无法创建");
            }
            Ok(self.spawned.fetch_add(1, Ordering::SeqCst))
        }

        async fn perform_work(
            &self,
            worker: &usize,
            args: &Vec<String>,
            breakpoints: &Breakpoints<'_, Self>,
        ) -> anyhow::Result<Vec<String>> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                anyhow::bail!("执行失败");
            }

            for (i, item) in args.iter().enumerate() {
                tokio::time::sleep(self.step).await;
                self.log.lock().push(item.clone());
                breakpoints.offer(worker, args.len() - i - 1).await;
            }
            Ok(args.clone())
        }

        async fn on_worker_expired(&self, _worker: usize) {
            self.expired.fetch_add(1, Ordering::SeqCst);
        }

        fn should_prioritize(&self, next: &Vec<String>, remaining: &usize) -> bool {
            next.len() < *remaining
        }
    }

    fn items(prefix: &str, count: usize) -> Vec<String> {
        (1..=count).map(|i| format!("{}{}", prefix, i)).collect()
    }

    fn pool(policy: TestPolicy, max_workers: usize) -> WorkerPool<TestPolicy> {
        WorkerPool::new(
            policy,
            PoolOptions {
                max_workers,
                worker_expires_after: Duration::from_secs(120),
            },
        )
    }

    #[tokio::test]
    async fn test_push_returns_result_and_reuses_worker() {
        let pool = pool(TestPolicy::default(), 1);

        assert_eq!(pool.push(items("a", 2)).await.unwrap(), items("a", 2));
        assert_eq!(pool.push(items("b", 1)).await.unwrap(), items("b", 1));

        assert_eq!(pool.policy().spawned.load(Ordering::SeqCst), 1);
        assert_eq!(pool.size(), 0);
    }

    #[tokio::test]
    async fn test_callback_form_delivers_result() {
        let pool = pool(TestPolicy::default(), 1);
        let (tx, rx) = oneshot::channel();

        pool.push_with(items("x", 3), move |result| {
            let _ = tx.send(result);
        });

        assert_eq!(rx.await.unwrap(), items("x", 3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_count_is_bounded() {
        let policy = TestPolicy {
            hang: true,
            ..Default::default()
        };
        let pool = pool(policy, 2);

        for i in 0..3 {
            pool.push_with(items(&i.to_string(), 1), |_| {});
        }
        tokio::time::sleep(Duration::from_millis(10)).await;

        let stats = pool.stats();
        assert_eq!(stats.busy, 2);
        assert_eq!(stats.workers, 2);
        assert_eq!(stats.backlog, 1);
        assert_eq!(pool.policy().spawned.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_worker_is_evicted_once() {
        let pool = pool(TestPolicy::default(), 1);
        pool.push(items("a", 1)).await.unwrap();
        assert_eq!(pool.stats().workers, 1);

        tokio::time::sleep(Duration::from_secs(121)).await;
        assert_eq!(pool.policy().expired.load(Ordering::SeqCst), 1);
        assert_eq!(pool.stats().workers, 0);

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(pool.policy().expired.load(Ordering::SeqCst), 1);

        // 回收后按需重新创建
        pool.push(items("b", 1)).await.unwrap();
        assert_eq!(pool.policy().spawned.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reuse_restarts_idle_timer() {
        let pool = pool(TestPolicy::default(), 1);

        pool.push(items("a", 1)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(100)).await;
        pool.push(items("b", 1)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(pool.policy().expired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(pool.policy().expired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_task_is_retried() {
        let policy = TestPolicy {
            failures_left: AtomicUsize::new(2),
            ..Default::default()
        };
        let pool = pool(policy, 1);

        assert_eq!(pool.push(items("r", 2)).await.unwrap(), items("r", 2));
        assert_eq!(pool.policy().spawned.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_failure_keeps_task_in_backlog() {
        let policy = TestPolicy {
            fail_spawn: true,
            ..Default::default()
        };
        let pool = pool(policy, 1);

        pool.push_with(items("s", 1), |_| panic!("不应该有结果"));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(
            pool.stats(),
            PoolStats {
                backlog: 1,
                workers: 0,
                busy: 0,
                spawning: 0,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shorter_task_interleaves_between_steps() {
        let policy = TestPolicy {
            step: Duration::from_millis(10),
            ..Default::default()
        };
        let pool = pool(policy, 1);

        let long = pool.push(items("l", 6));
        let short = pool.push(items("s", 2));

        let short_result = short.await.unwrap();
        assert_eq!(pool.policy().log.lock().clone(), vec!["l1", "s1", "s2"]);

        long.await.unwrap();
        assert_eq!(short_result, items("s", 2));
        assert_eq!(
            pool.policy().log.lock().clone(),
            vec!["l1", "s1", "s2", "l2", "l3", "l4", "l5", "l6"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_longer_task_waits_its_turn() {
        let policy = TestPolicy {
            step: Duration::from_millis(10),
            ..Default::default()
        };
        let pool = pool(policy, 1);

        let first = pool.push(items("a", 3));
        let second = pool.push(items("b", 3));
        first.await.unwrap();
        second.await.unwrap();

        assert_eq!(
            pool.policy().log.lock().clone(),
            vec!["a1", "a2", "a3", "b1", "b2", "b3"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_interleaving_is_one_level_deep() {
        let policy = TestPolicy {
            step: Duration::from_millis(10),
            ..Default::default()
        };
        let pool = pool(policy, 1);

        let long = pool.push(items("l", 6));
        let medium = pool.push(items("m", 2));
        let tiny = pool.push(items("t", 1));

        long.await.unwrap();
        medium.await.unwrap();
        tiny.await.unwrap();

        assert_eq!(
            pool.policy().log.lock().clone(),
            vec!["l1", "m1", "m2", "l2", "t1", "l3", "l4", "l5", "l6"]
        );
    }
}
