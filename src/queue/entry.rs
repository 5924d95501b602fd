use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// 任务结果的送达方式
pub(crate) enum Reply<R> {
    Channel(oneshot::Sender<R>),
    Callback(Box<dyn FnOnce(R) + Send>),
}

impl<R> Reply<R> {
    pub(crate) fn send(self, result: R) {
        match self {
            // 调用方已经放弃等待时直接丢弃结果
            Reply::Channel(tx) => {
                let _ = tx.send(result);
            }
            Reply::Callback(callback) => callback(result),
        }
    }
}

/// 待处理任务
pub(crate) struct QueueEntry<A, R> {
    pub args: A,
    pub reply: Reply<R>,
    pub enqueued_at: Instant,
}

/// worker 记录
pub(crate) struct WorkerRecord<W> {
    pub id: u64,
    pub worker: W,
    pub is_busy: bool,
    /// 空闲回收定时器
    pub expiry: Option<JoinHandle<()>>,
    /// 每次重新计时递增，过期的定时器据此失效
    pub expiry_generation: u64,
}

impl<W> WorkerRecord<W> {
    pub fn new(id: u64, worker: W) -> Self {
        Self {
            id,
            worker,
            is_busy: true,
            expiry: None,
            expiry_generation: 0,
        }
    }

    pub fn clear_expiry(&mut self) {
        if let Some(timer) = self.expiry.take() {
            timer.abort();
        }
        self.expiry_generation += 1;
    }
}
