//! 浏览器能力抽象
//!
//! 查词策略只依赖这里的两个 trait，不关心背后是真实浏览器还是测试替身。

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

/// 页面上一个结果块的原始文本
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBlock {
    /// 词条正文
    pub word: Option<String>,
    /// 词性等附加说明
    pub word_type: Option<String>,
    /// 音译
    pub translit: Option<String>,
    /// 释义
    pub translation: Option<String>,
}

/// 可以执行查词交互的页面
#[async_trait]
pub trait LookupPage: Send + Sync + 'static {
    /// 导航到指定 URL
    async fn navigate(&self, url: &str) -> Result<()>;

    /// 页面上是否存在匹配选择器的元素
    async fn has_element(&self, selector: &str) -> Result<bool>;

    /// 在输入框中输入文本
    async fn type_into(&self, selector: &str, text: &str) -> Result<()>;

    /// 点击提交按钮，等待 URL 以 `response_url` 开头的网络响应
    ///
    /// 每次调用只发出一次查询请求，迟到的重复响应不会落到下一个词上。
    async fn submit(&self, button_selector: &str, response_url: &str) -> Result<()>;

    /// 按文档顺序读取匹配选择器的所有结果块
    async fn query_blocks(&self, selector: &str) -> Result<Vec<RawBlock>>;

    /// 清空输入框
    async fn clear_input(&self, selector: &str) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// 浏览器后端
///
/// 一个浏览器会话可以打开多个页面。
#[async_trait]
pub trait BrowserBackend: Send + Sync + 'static {
    type Browser: Send + Sync + 'static;
    type Page: LookupPage;

    /// 启动（或连接）浏览器
    async fn launch(&self) -> Result<Self::Browser>;

    /// 在已有浏览器中打开新页面
    async fn open_page(&self, browser: &Self::Browser) -> Result<Self::Page>;

    /// 关闭浏览器会话
    async fn close(&self, browser: &Self::Browser) -> Result<()>;
}
