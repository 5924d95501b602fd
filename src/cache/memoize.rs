//! 带缓存的函数包装
//!
//! - 标准模式：由调用参数推导 key 路径，命中直接返回，未命中则调用并写入
//! - 自定义模式：被包装的函数拿到缓存句柄，自行决定缓存什么

use std::future::Future;

use super::store::{CacheOptions, CacheStore, KeyPath};
use crate::error::ConfigError;

/// 标准模式的缓存包装
pub struct Memoized<F, K, D> {
    store: CacheStore<D>,
    compute: F,
    key_of: K,
}

impl<F, K, D> Memoized<F, K, D>
where
    D: Clone + Send + 'static,
{
    /// # 参数
    /// - `compute`: 被包装的异步函数
    /// - `key_of`: 由调用参数推导 key 路径
    /// - `options`: 缓存配置
    pub fn new(compute: F, key_of: K, options: CacheOptions) -> Result<Self, ConfigError> {
        Ok(Self {
            store: CacheStore::new(options)?,
            compute,
            key_of,
        })
    }

    pub async fn call<A, Fut>(&self, args: A) -> D
    where
        K: Fn(&A) -> KeyPath,
        F: Fn(A) -> Fut,
        Fut: Future<Output = D>,
    {
        let key_path = (self.key_of)(&args);
        if let Some(hit) = self.store.get(key_path.clone()) {
            return hit;
        }

        let value = (self.compute)(args).await;
        self.store.set(key_path, value.clone());
        value
    }

    /// 与 `call` 相同，但只缓存成功的结果
    pub async fn try_call<A, Fut, E>(&self, args: A) -> Result<D, E>
    where
        K: Fn(&A) -> KeyPath,
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<D, E>>,
    {
        let key_path = (self.key_of)(&args);
        if let Some(hit) = self.store.get(key_path.clone()) {
            return Ok(hit);
        }

        let value = (self.compute)(args).await?;
        self.store.set(key_path, value.clone());
        Ok(value)
    }

    pub fn store(&self) -> &CacheStore<D> {
        &self.store
    }
}

/// 自定义模式的缓存包装
///
/// 适用于一次调用同时计算多个子 key 结果的场景，每个子 key 可以单独缓存。
pub struct CustomMemoized<F, D> {
    store: CacheStore<D>,
    compute: F,
}

impl<F: Clone, D> Clone for CustomMemoized<F, D> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            compute: self.compute.clone(),
        }
    }
}

impl<F, D> CustomMemoized<F, D>
where
    D: Clone + Send + 'static,
{
    pub fn new(compute: F, options: CacheOptions) -> Result<Self, ConfigError> {
        Ok(Self {
            store: CacheStore::new(options)?,
            compute,
        })
    }

    /// 调用被包装的函数
    ///
    /// 返回值原样交回：同步函数直接得到结果，异步函数得到 future。
    pub fn call<A, R>(&self, args: A) -> R
    where
        F: Fn(CacheStore<D>, A) -> R,
    {
        (self.compute)(self.store.clone(), args)
    }

    pub fn store(&self) -> &CacheStore<D> {
        &self.store
    }
}
