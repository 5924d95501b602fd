//! 查词调度策略
//!
//! 把通用 worker 池落到浏览器自动化上：worker 是一个已打开词典的页面，
//! 所有页面共享同一个浏览器会话。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use super::scrape::{
    collect_entries, merge_interleaved, EVEN_BLOCK_SELECTOR, INPUT_SELECTOR, ODD_BLOCK_SELECTOR,
    SUBMIT_SELECTOR,
};
use crate::browser::{BrowserBackend, LookupPage, SharedSession};
use crate::cache::CacheStore;
use crate::config::Config;
use crate::error::BrowserError;
use crate::models::{SingleWordData, WordsData};
use crate::queue::{Breakpoints, WorkerPolicy};
use crate::utils::logging::truncate_text;

/// 查词策略配置
#[derive(Clone, Debug)]
pub struct TranslatorOptions {
    /// 词典页面 URL
    pub target_url: String,
    /// 查询结果对应的网络请求 URL
    pub response_url: String,
    /// 创建页面的最大尝试次数
    pub spawn_attempts: usize,
    /// 两次尝试之间的等待时间
    pub spawn_retry_delay: Duration,
}

impl TranslatorOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            target_url: config.target_url.clone(),
            response_url: config.response_url.clone(),
            spawn_attempts: config.spawn_attempts,
            spawn_retry_delay: config.spawn_retry_delay(),
        }
    }
}

/// 查词调度策略
///
/// 职责：
/// - 创建页面（带重试）和回收页面
/// - 逐词执行查询，先查缓存，结果写回缓存
/// - 每查完一个词给更短的排队任务一次插队机会
pub struct TranslatorPolicy<B: BrowserBackend> {
    backend: B,
    session: SharedSession<B::Browser>,
    cache: CacheStore<SingleWordData>,
    options: TranslatorOptions,
}

impl<B: BrowserBackend> TranslatorPolicy<B> {
    pub fn new(backend: B, cache: CacheStore<SingleWordData>, options: TranslatorOptions) -> Self {
        Self {
            backend,
            session: SharedSession::new(),
            cache,
            options,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn session(&self) -> &SharedSession<B::Browser> {
        &self.session
    }

    /// 打开一个页面并导航到词典
    ///
    /// 成功时页面持有一次共享会话，失败时归还。
    async fn open_page(&self) -> Result<B::Page> {
        let browser = self.session.acquire(|| self.backend.launch()).await?;

        let page = match self.backend.open_page(&browser).await {
            Ok(page) => page,
            Err(e) => {
                self.release_session().await;
                return Err(e);
            }
        };

        if let Err(e) = page.navigate(&self.options.target_url).await {
            if let Err(close_err) = page.close().await {
                debug!("关闭导航失败的页面出错: {:#}", close_err);
            }
            self.release_session().await;
            return Err(e);
        }

        Ok(page)
    }

    /// 归还一次会话持有，最后一个持有者负责关闭浏览器
    async fn release_session(&self) {
        if let Some(browser) = self.session.release() {
            info!("🔒 最后一个页面已释放，关闭浏览器");
            if let Err(e) = self.backend.close(&browser).await {
                warn!("关闭浏览器失败: {:#}", e);
            }
        }
    }

    /// 在页面上查一个词
    async fn lookup_word(&self, page: &B::Page, word: &str) -> Result<SingleWordData> {
        page.type_into(INPUT_SELECTOR, word).await?;
        page.submit(SUBMIT_SELECTOR, &self.options.response_url).await?;

        let odd = page.query_blocks(ODD_BLOCK_SELECTOR).await?;
        let even = page.query_blocks(EVEN_BLOCK_SELECTOR).await?;
        Ok(collect_entries(merge_interleaved(odd, even)))
    }
}

#[async_trait]
impl<B: BrowserBackend> WorkerPolicy for TranslatorPolicy<B> {
    type Args = Vec<String>;
    type Output = WordsData;
    type Worker = Arc<B::Page>;
    /// 当前任务还剩多少个词
    type Breakpoint = usize;

    async fn spawn_worker(&self) -> Result<Arc<B::Page>> {
        let attempts = self.options.spawn_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.open_page().await {
                Ok(page) => {
                    info!("✓ 词典页面已就绪 (第 {}/{} 次尝试)", attempt, attempts);
                    return Ok(Arc::new(page));
                }
                Err(e) => {
                    warn!("打开词典页面失败 (尝试 {}/{}): {:#}", attempt, attempts, e);
                    last_error = format!("{:#}", e);
                    if attempt < attempts {
                        tokio::time::sleep(self.options.spawn_retry_delay).await;
                    }
                }
            }
        }

        error!("❌ 打开词典页面失败，已重试 {} 次", attempts);
        Err(BrowserError::SpawnExhausted {
            attempts,
            last_error,
        }
        .into())
    }

    /// 逐词查询
    ///
    /// 页面出错时不返回错误，而是返回已经查到的部分结果。
    async fn perform_work(
        &self,
        page: &Arc<B::Page>,
        words: &Vec<String>,
        breakpoints: &Breakpoints<'_, Self>,
    ) -> Result<WordsData> {
        let mut data = WordsData::new();
        let mut pending: Vec<&String> = Vec::new();

        for word in words {
            if data.contains_key(word) || pending.contains(&word) {
                continue;
            }
            match self.cache.get(word) {
                Some(hit) => {
                    data.insert(word.clone(), hit);
                }
                None => pending.push(word),
            }
        }

        if pending.is_empty() {
            return Ok(data);
        }

        for selector in [INPUT_SELECTOR, SUBMIT_SELECTOR] {
            match page.has_element(selector).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!("页面缺少元素 {}，返回部分结果", selector);
                    return Ok(data);
                }
                Err(e) => {
                    warn!("检查页面元素 {} 失败，返回部分结果: {:#}", selector, e);
                    return Ok(data);
                }
            }
        }

        let total = pending.len();
        debug!(
            "开始查询 {} 个词: {}",
            total,
            truncate_text(&pending.iter().map(|w| w.as_str()).collect::<Vec<_>>().join(", "), 60)
        );

        for (index, word) in pending.into_iter().enumerate() {
            match self.lookup_word(page.as_ref(), word).await {
                Ok(entries) => {
                    debug!("'{}' 查到 {} 条释义", word, entries.len());
                    self.cache.set(word, entries.clone());
                    data.insert(word.clone(), entries);
                }
                Err(e) => {
                    warn!("查询 '{}' 失败，返回部分结果: {:#}", word, e);
                    return Ok(data);
                }
            }

            if let Err(e) = page.clear_input(INPUT_SELECTOR).await {
                warn!("清空输入框失败，返回部分结果: {:#}", e);
                return Ok(data);
            }

            breakpoints.offer(page, total - index - 1).await;
        }

        Ok(data)
    }

    async fn on_worker_expired(&self, page: Arc<B::Page>) {
        if let Err(e) = page.close().await {
            warn!("关闭页面失败: {:#}", e);
        }
        self.release_session().await;
    }

    fn should_prioritize(&self, next: &Vec<String>, remaining: &usize) -> bool {
        next.len() < *remaining
    }
}
