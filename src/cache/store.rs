//! 分层缓存存储
//!
//! 按 key 路径（一个或多个字符串段）寻址的嵌套缓存，按命中次数淘汰，
//! 支持条目过期和按 cron 表达式整体清空。

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use cron::Schedule;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::ConfigError;

/// 每层默认的最大条目数
pub const DEFAULT_MAX_SIZE: usize = 150;

/// 缓存 key 路径
///
/// 单段路径是最常见的情况；多段路径让外层缓存为每个内层 key 单独保存数据。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct KeyPath(Vec<String>);

impl KeyPath {
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }
}

impl From<&str> for KeyPath {
    fn from(key: &str) -> Self {
        KeyPath(vec![key.to_string()])
    }
}

impl From<String> for KeyPath {
    fn from(key: String) -> Self {
        KeyPath(vec![key])
    }
}

impl From<&String> for KeyPath {
    fn from(key: &String) -> Self {
        KeyPath(vec![key.clone()])
    }
}

impl From<Vec<String>> for KeyPath {
    fn from(segments: Vec<String>) -> Self {
        KeyPath(segments)
    }
}

impl From<&[&str]> for KeyPath {
    fn from(segments: &[&str]) -> Self {
        KeyPath(segments.iter().map(|s| s.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for KeyPath {
    fn from(segments: [&str; N]) -> Self {
        KeyPath(segments.iter().map(|s| s.to_string()).collect())
    }
}

/// 缓存配置
#[derive(Clone, Debug)]
pub struct CacheOptions {
    /// 每层的最大条目数
    pub max_size: usize,
    /// 条目写入后的存活时间
    pub timeout: Option<Duration>,
    /// 整体清空的 cron 表达式（支持 5 段或 6/7 段格式）
    pub rotation_schedule: Option<String>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            timeout: None,
            rotation_schedule: None,
        }
    }
}

impl CacheOptions {
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_rotation(mut self, expression: impl Into<String>) -> Self {
        self.rotation_schedule = Some(expression.into());
        self
    }
}

enum Node<D> {
    Leaf(D),
    Branch(Level<D>),
}

struct CacheEntry<D> {
    node: Node<D>,
    hits: u64,
    /// 写入顺序，命中次数相同时先淘汰更早的条目
    seq: u64,
    /// 删除时间，叶子和中间节点都有
    expires_at: Option<Instant>,
}

impl<D> CacheEntry<D> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

/// 每次写入都安排一次删除，已安排的更早删除不会被推迟
fn earliest(current: Option<Instant>, scheduled: Option<Instant>) -> Option<Instant> {
    match (current, scheduled) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

type Level<D> = HashMap<String, CacheEntry<D>>;

struct Inner<D> {
    root: Level<D>,
    next_seq: u64,
}

/// 分层缓存
///
/// 克隆得到的是同一份存储的句柄，可以作为 `{get, set}` 能力交给任何需要细粒度缓存的计算。
pub struct CacheStore<D> {
    inner: Arc<Mutex<Inner<D>>>,
    max_size: usize,
    timeout: Option<Duration>,
}

impl<D> Clone for CacheStore<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            max_size: self.max_size,
            timeout: self.timeout,
        }
    }
}

impl<D: Clone + Send + 'static> CacheStore<D> {
    /// 创建缓存
    ///
    /// 配置了轮换计划时需要在 tokio 运行时中调用。
    pub fn new(options: CacheOptions) -> Result<Self, ConfigError> {
        let schedule = options
            .rotation_schedule
            .as_deref()
            .map(parse_rotation_schedule)
            .transpose()?;

        let store = Self {
            inner: Arc::new(Mutex::new(Inner {
                root: HashMap::new(),
                next_seq: 0,
            })),
            max_size: options.max_size.max(1),
            timeout: options.timeout,
        };

        if let Some(schedule) = schedule {
            let handle = Handle::try_current().map_err(|_| {
                ConfigError::invalid_value("rotation_schedule", "缓存轮换需要在 tokio 运行时中启用")
            })?;
            spawn_rotation(&handle, Arc::downgrade(&store.inner), schedule);
        }

        Ok(store)
    }

    /// 按路径读取缓存
    ///
    /// 路径深度必须与写入时完全一致，中间节点不可寻址。沿途经过的每个条目都会累加命中次数。
    pub fn get(&self, key_path: impl Into<KeyPath>) -> Option<D> {
        let key_path = key_path.into();
        let mut inner = self.inner.lock();
        lookup(&mut inner.root, key_path.segments(), Instant::now())
    }

    /// 按路径写入缓存
    pub fn set(&self, key_path: impl Into<KeyPath>, value: D) {
        let key_path = key_path.into();
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let Inner { root, next_seq } = &mut *inner;

        let mut ctx = InsertCtx {
            max_size: self.max_size,
            now,
            expires_at: self.timeout.map(|timeout| now + timeout),
            next_seq,
        };
        insert(root, key_path.segments(), value, &mut ctx);
    }

    /// 顶层未过期的条目数量
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.root.retain(|_, entry| !entry.is_expired(now));
        inner.root.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.lock().root.clear();
    }
}

fn lookup<D: Clone>(level: &mut Level<D>, segments: &[String], now: Instant) -> Option<D> {
    let (key, rest) = segments.split_first()?;

    if level.get(key).is_some_and(|entry| entry.is_expired(now)) {
        level.remove(key);
        return None;
    }

    let entry = level.get_mut(key)?;
    entry.hits += 1;

    match &mut entry.node {
        Node::Branch(children) if !rest.is_empty() => lookup(children, rest, now),
        Node::Leaf(value) if rest.is_empty() => Some(value.clone()),
        _ => None,
    }
}

struct InsertCtx<'a> {
    max_size: usize,
    now: Instant,
    expires_at: Option<Instant>,
    next_seq: &'a mut u64,
}

impl InsertCtx<'_> {
    fn bump_seq(&mut self) -> u64 {
        let seq = *self.next_seq;
        *self.next_seq += 1;
        seq
    }
}

fn insert<D>(level: &mut Level<D>, segments: &[String], value: D, ctx: &mut InsertCtx<'_>) {
    let Some((key, rest)) = segments.split_first() else {
        return;
    };

    if level.get(key).is_some_and(|entry| entry.is_expired(ctx.now)) {
        level.remove(key);
    }

    if !level.contains_key(key) {
        make_room(level, ctx.max_size, ctx.now);
    }

    if rest.is_empty() {
        let previous = level.get(key).and_then(|entry| entry.expires_at);
        let seq = ctx.bump_seq();
        level.insert(
            key.clone(),
            CacheEntry {
                node: Node::Leaf(value),
                hits: 1,
                seq,
                expires_at: earliest(previous, ctx.expires_at),
            },
        );
        return;
    }

    if !level.contains_key(key) {
        let seq = ctx.bump_seq();
        level.insert(
            key.clone(),
            CacheEntry {
                node: Node::Branch(HashMap::new()),
                hits: 1,
                seq,
                expires_at: None,
            },
        );
    }

    let Some(entry) = level.get_mut(key) else {
        return;
    };
    // 已有叶子节点的路径不会被改写成中间节点
    if let Node::Branch(children) = &mut entry.node {
        entry.expires_at = earliest(entry.expires_at, ctx.expires_at);
        insert(children, rest, value, ctx);
    }
}

/// 插入新 key 前为当前层腾出空间
fn make_room<D>(level: &mut Level<D>, max_size: usize, now: Instant) {
    if level.len() < max_size {
        return;
    }

    level.retain(|_, entry| !entry.is_expired(now));
    if level.len() < max_size {
        return;
    }

    let mut ranked: Vec<(u64, u64, String)> = level
        .iter()
        .map(|(key, entry)| (entry.hits, entry.seq, key.clone()))
        .collect();
    ranked.sort_unstable();

    let overflow = level.len() - max_size + 1;
    for (_, _, key) in ranked.into_iter().take(overflow) {
        level.remove(&key);
    }
    debug!("缓存已满，淘汰 {} 个命中最少的条目", overflow);
}

/// 解析轮换用的 cron 表达式
///
/// 5 段格式（分 时 日 月 周）会补上秒字段。
pub fn parse_rotation_schedule(expression: &str) -> Result<Schedule, ConfigError> {
    let trimmed = expression.trim();
    let normalized = if trimmed.split_whitespace().count() == 5 {
        format!("0 {}", trimmed)
    } else {
        trimmed.to_string()
    };

    Schedule::from_str(&normalized).map_err(|e| ConfigError::InvalidCron {
        expression: expression.to_string(),
        reason: e.to_string(),
    })
}

fn spawn_rotation<D: Send + 'static>(handle: &Handle, store: Weak<Mutex<Inner<D>>>, schedule: Schedule) {
    handle.spawn(async move {
        while let Some(next) = schedule.upcoming(Utc).next() {
            let delay = (next - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(delay).await;

            let Some(inner) = store.upgrade() else {
                break;
            };
            let dropped = {
                let mut inner = inner.lock();
                let dropped = inner.root.len();
                inner.root.clear();
                dropped
            };
            info!("🔄 缓存轮换完成，清空 {} 个条目", dropped);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(max_size: usize) -> CacheStore<String> {
        CacheStore::new(CacheOptions::default().with_max_size(max_size)).unwrap()
    }

    #[test]
    fn test_set_then_get_at_any_depth() {
        let cache = store(10);

        cache.set("a", "1".to_string());
        cache.set(["b", "c"], "2".to_string());
        cache.set(["d", "e", "f"], "3".to_string());

        assert_eq!(cache.get("a"), Some("1".to_string()));
        assert_eq!(cache.get(["b", "c"]), Some("2".to_string()));
        assert_eq!(cache.get(["d", "e", "f"]), Some("3".to_string()));
    }

    #[test]
    fn test_depth_mismatch_is_a_miss() {
        let cache = store(10);
        cache.set(["outer", "inner"], "v".to_string());
        cache.set("leaf", "v".to_string());

        // 中间节点不可寻址
        assert_eq!(cache.get("outer"), None);
        // 路径比写入时更长
        assert_eq!(cache.get(["outer", "inner", "deeper"]), None);
        assert_eq!(cache.get(["leaf", "child"]), None);
        // 空路径
        assert_eq!(cache.get(Vec::<String>::new()), None);
    }

    #[test]
    fn test_existing_leaf_is_not_turned_into_branch() {
        let cache = store(10);
        cache.set("word", "leaf".to_string());
        cache.set(["word", "sub"], "nested".to_string());

        assert_eq!(cache.get("word"), Some("leaf".to_string()));
        assert_eq!(cache.get(["word", "sub"]), None);
    }

    #[test]
    fn test_eviction_keeps_level_within_max_size() {
        let cache = store(10);
        for i in 0..25 {
            cache.set(format!("key-{}", i), i.to_string());
            assert!(cache.len() <= 10);
        }
        assert_eq!(cache.len(), 10);
        assert_eq!(cache.get("key-24"), Some("24".to_string()));
    }

    #[test]
    fn test_eviction_drops_least_hit_entries_first() {
        let cache = store(3);
        cache.set("a", "a".to_string());
        cache.set("b", "b".to_string());
        cache.set("c", "c".to_string());
        cache.get("a");
        cache.get("c");

        cache.set("d", "d".to_string());

        assert_eq!(cache.get("b"), None);
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
        assert!(cache.get("d").is_some());
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let cache = store(2);
        cache.set("a", "1".to_string());
        cache.set("b", "1".to_string());
        cache.set("a", "2".to_string());

        assert_eq!(cache.get("a"), Some("2".to_string()));
        assert_eq!(cache.get("b"), Some("1".to_string()));
    }

    #[test]
    fn test_nested_levels_are_bounded_independently() {
        let cache = store(2);
        for inner in ["x", "y", "z"] {
            cache.set(["outer", inner], inner.to_string());
        }
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(["outer", "z"]), Some("z".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_timeout() {
        let cache: CacheStore<u32> = CacheStore::new(
            CacheOptions::default().with_timeout(Duration::from_secs(10)),
        )
        .unwrap();
        cache.set("k", 7);

        tokio::time::advance(Duration::from_millis(9_900)).await;
        assert_eq!(cache.get("k"), Some(7));

        tokio::time::advance(Duration::from_millis(200)).await;
        assert_eq!(cache.get("k"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rewrite_keeps_first_deadline() {
        let cache: CacheStore<u32> = CacheStore::new(
            CacheOptions::default().with_timeout(Duration::from_secs(10)),
        )
        .unwrap();
        cache.set("k", 1);
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.set("k", 2);

        tokio::time::advance(Duration::from_millis(1_900)).await;
        assert_eq!(cache.get("k"), Some(2));

        tokio::time::advance(Duration::from_millis(200)).await;
        assert_eq!(cache.get("k"), None);

        // 删除之后重新写入，重新计时
        cache.set("k", 3);
        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(cache.get("k"), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_outer_keys_expire_with_their_leaves() {
        let cache: CacheStore<u32> = CacheStore::new(
            CacheOptions::default()
                .with_max_size(3)
                .with_timeout(Duration::from_secs(10)),
        )
        .unwrap();
        for i in 0..3 {
            cache.set([format!("outer{}", i).as_str(), "inner"], i);
        }
        assert_eq!(cache.len(), 3);

        tokio::time::advance(Duration::from_millis(10_100)).await;

        assert_eq!(cache.get(["outer0", "inner"]), None);
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_outer_keys_make_room_before_eviction() {
        let cache: CacheStore<u32> = CacheStore::new(
            CacheOptions::default()
                .with_max_size(2)
                .with_timeout(Duration::from_secs(10)),
        )
        .unwrap();
        cache.set(["old", "inner"], 1);
        tokio::time::advance(Duration::from_secs(6)).await;
        cache.set(["fresh", "inner"], 2);
        tokio::time::advance(Duration::from_secs(5)).await;

        // "old" 已过期，腾出位置时不应淘汰仍然有效的 "fresh"
        cache.set(["new", "inner"], 3);

        assert_eq!(cache.get(["fresh", "inner"]), Some(2));
        assert_eq!(cache.get(["new", "inner"]), Some(3));
        assert_eq!(cache.get(["old", "inner"]), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotation_clears_whole_store() {
        let cache: CacheStore<u32> =
            CacheStore::new(CacheOptions::default().with_rotation("* * * * * *")).unwrap();
        cache.set("a", 1);
        cache.set(["b", "c"], 2);

        tokio::time::sleep(Duration::from_millis(1_500)).await;

        assert!(cache.is_empty());
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn test_rotation_requires_runtime() {
        let result: Result<CacheStore<u32>, _> =
            CacheStore::new(CacheOptions::default().with_rotation("0 0 * * *"));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_parse_rotation_schedule() {
        assert!(parse_rotation_schedule("0 3 * * *").is_ok());
        assert!(parse_rotation_schedule("0 0 3 * * *").is_ok());
        assert!(matches!(
            parse_rotation_schedule("not a schedule"),
            Err(ConfigError::InvalidCron { .. })
        ));
    }
}
