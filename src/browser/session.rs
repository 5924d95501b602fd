//! 多个页面共享的浏览器会话

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use tokio::sync::OnceCell;

struct SessionState<S> {
    cell: Arc<OnceCell<Arc<S>>>,
    holders: usize,
}

/// 共享浏览器会话
///
/// - 第一次使用时才启动，并发的 `acquire` 共享同一次启动
/// - 启动失败时保持为空，下一次 `acquire` 重新启动
/// - 按持有者计数，最后一个持有者释放时才交出会话去关闭
pub struct SharedSession<S> {
    state: Mutex<SessionState<S>>,
}

impl<S> Default for SharedSession<S> {
    fn default() -> Self {
        Self {
            state: Mutex::new(SessionState {
                cell: Arc::new(OnceCell::new()),
                holders: 0,
            }),
        }
    }
}

impl<S: Send + Sync + 'static> SharedSession<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取会话，必要时启动
    ///
    /// 成功后持有者计数加一，需要与 [`SharedSession::release`] 配对。
    pub async fn acquire<F, Fut>(&self, launch: F) -> Result<Arc<S>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<S>>,
    {
        let cell = {
            let mut state = self.state.lock();
            state.holders += 1;
            Arc::clone(&state.cell)
        };

        let launched = cell
            .get_or_try_init(|| async { launch().await.map(Arc::new) })
            .await
            .map(Arc::clone);

        if launched.is_err() {
            self.release();
        }
        launched
    }

    /// 释放一次持有
    ///
    /// 最后一个持有者释放时清空共享引用，并返回会话交给调用方关闭。
    pub fn release(&self) -> Option<Arc<S>> {
        let mut state = self.state.lock();
        state.holders = state.holders.saturating_sub(1);
        if state.holders > 0 {
            return None;
        }

        let previous = std::mem::replace(&mut state.cell, Arc::new(OnceCell::new()));
        previous.get().cloned()
    }

    pub fn holders(&self) -> usize {
        self.state.lock().holders
    }

    /// 当前是否有已启动的会话
    pub fn is_active(&self) -> bool {
        self.state.lock().cell.initialized()
    }
}
