//! # Word Lookup
//!
//! 通过浏览器自动化查询在线词典的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统分为四层：
//!
//! ### ① 通用组件层
//! - `cache/` - 按层级键路径记忆化的缓存，支持容量淘汰、过期和定时清空
//! - `queue/` - 有上限的 worker 池，负责排队、复用、回收和失败重试
//!
//! ### ② 基础设施层（Browser）
//! - `browser/` - 浏览器后端抽象和 chromiumoxide 实现
//! - `SharedSession` - 所有页面共享同一个浏览器，最后一个页面释放时关闭
//!
//! ### ③ 业务层（Translator）
//! - `translator/policy` - 把 worker 池落到词典页面上，逐词查询并允许短任务插队
//! - `translator/scrape` - 结果块的合并和解析
//! - `Translator` - 对外的查词入口
//!
//! ### ④ 应用层
//! - `app` - 初始化和运行
//!
//! ## 模块结构

pub mod app;
pub mod browser;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod queue;
pub mod translator;
pub mod utils;

// 重新导出常用类型
pub use app::App;
pub use cache::{CacheOptions, CacheStore, CustomMemoized, KeyPath, Memoized};
pub use config::{AppEnv, Config};
pub use error::{AppError, AppResult};
pub use models::{SingleWordData, WordDataEntry, WordsData};
pub use queue::{PoolOptions, WorkerPolicy, WorkerPool};
pub use translator::Translator;
