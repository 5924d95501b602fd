//! 查词入口

use std::future::Future;

use tracing::info;

use super::policy::{TranslatorOptions, TranslatorPolicy};
use crate::browser::BrowserBackend;
use crate::cache::{CacheOptions, CacheStore, CustomMemoized};
use crate::config::Config;
use crate::error::{AppResult, ConfigError};
use crate::models::{SingleWordData, WordsData};
use crate::queue::{PoolOptions, PoolStats, WorkerPool};

/// 按缓存拆分一批词：(已命中的结果, 需要查询的词)
type SplitCached = fn(CacheStore<SingleWordData>, Vec<String>) -> (WordsData, Vec<String>);

/// 查词服务
///
/// 先用缓存过滤已知的词，剩下的词作为一个任务交给 worker 池。
/// 缓存由自定义模式的记忆化包装持有，worker 池里的查词策略共享同一份存储逐词写入。
pub struct Translator<B: BrowserBackend> {
    pool: WorkerPool<TranslatorPolicy<B>>,
    split: CustomMemoized<SplitCached, SingleWordData>,
}

impl<B: BrowserBackend> Clone for Translator<B> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            split: self.split.clone(),
        }
    }
}

impl<B: BrowserBackend> Translator<B> {
    /// 创建查词服务
    ///
    /// 配置了缓存轮换时需要在 tokio 运行时中调用。
    pub fn new(backend: B, config: &Config) -> Result<Self, ConfigError> {
        let mut cache_options = CacheOptions::default().with_max_size(config.cache_max_size);
        if let Some(timeout) = config.cache_timeout() {
            cache_options = cache_options.with_timeout(timeout);
        }
        if let Some(rotation) = &config.cache_rotation {
            cache_options = cache_options.with_rotation(rotation.clone());
        }
        let split = CustomMemoized::new(split_cached as SplitCached, cache_options)?;

        let policy = TranslatorPolicy::new(
            backend,
            split.store().clone(),
            TranslatorOptions::from_config(config),
        );
        let pool = WorkerPool::new(
            policy,
            PoolOptions {
                max_workers: config.max_workers,
                worker_expires_after: config.worker_expires_after(),
            },
        );

        Ok(Self { pool, split })
    }

    /// 查询一批词
    ///
    /// 任务在调用时立即入队。每个词都会出现在结果中，查不到释义的词对应空列表。
    pub fn lookup<I, S>(&self, words: I) -> impl Future<Output = AppResult<WordsData>> + Send + 'static
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (mut data, pending) = self.split_words(words);
        let fetched = (!pending.is_empty()).then(|| self.pool.push(pending.clone()));

        async move {
            if let Some(fetched) = fetched {
                data.extend(fetched.await?);
            }
            fill_missing(&mut data, pending);
            Ok(data)
        }
    }

    /// 查询一批词，结果通过回调送达
    pub fn lookup_with<I, S, F>(&self, words: I, callback: F)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnOnce(WordsData) + Send + 'static,
    {
        let (mut data, pending) = self.split_words(words);
        if pending.is_empty() {
            callback(data);
            return;
        }

        self.pool.push_with(pending.clone(), move |fetched| {
            data.extend(fetched);
            fill_missing(&mut data, pending);
            callback(data);
        });
    }

    /// 等待中的查词任务数
    pub fn backlog(&self) -> usize {
        self.pool.size()
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub fn cache(&self) -> &CacheStore<SingleWordData> {
        self.split.store()
    }

    pub fn policy(&self) -> &TranslatorPolicy<B> {
        self.pool.policy()
    }

    fn split_words<I, S>(&self, words: I) -> (WordsData, Vec<String>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let words: Vec<String> = words.into_iter().map(Into::into).collect();
        self.split.call(words)
    }
}

/// 拆分为缓存命中的结果和需要查询的词（去重，保持顺序）
fn split_cached(cache: CacheStore<SingleWordData>, words: Vec<String>) -> (WordsData, Vec<String>) {
    let mut data = WordsData::new();
    let mut pending: Vec<String> = Vec::new();

    for word in words {
        if data.contains_key(&word) || pending.contains(&word) {
            continue;
        }
        match cache.get(&word) {
            Some(hit) => {
                data.insert(word, hit);
            }
            None => pending.push(word),
        }
    }

    info!("📖 查词请求: {} 个命中缓存，{} 个待查询", data.len(), pending.len());
    (data, pending)
}

fn fill_missing(data: &mut WordsData, words: Vec<String>) {
    for word in words {
        data.entry(word).or_default();
    }
}
