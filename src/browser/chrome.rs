//! 基于 chromiumoxide 的浏览器后端

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::EventResponseReceived;
use chromiumoxide::element::Element;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::backend::{BrowserBackend, LookupPage, RawBlock};
use super::{connection, headless};
use crate::config::Config;
use crate::error::BrowserError;

/// Chrome 后端配置
#[derive(Clone, Debug)]
pub struct ChromeOptions {
    /// 设置后连接已有浏览器，不再自行启动
    pub debug_port: Option<u16>,
    pub executable: Option<String>,
    pub headless: bool,
    /// 等待查询响应的超时时间
    pub response_timeout: Duration,
}

impl ChromeOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            debug_port: config.browser_debug_port,
            executable: config.chrome_executable.clone(),
            headless: config.headless,
            response_timeout: config.response_timeout(),
        }
    }
}

/// 启动或连接得到的浏览器会话
pub struct ChromeBrowser {
    browser: Mutex<Browser>,
    events: JoinHandle<()>,
    /// 是否由本进程启动（连接来的浏览器不负责关闭）
    owned: bool,
}

pub struct ChromeBackend {
    options: ChromeOptions,
}

impl ChromeBackend {
    pub fn new(options: ChromeOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl BrowserBackend for ChromeBackend {
    type Browser = ChromeBrowser;
    type Page = ChromePage;

    async fn launch(&self) -> Result<ChromeBrowser> {
        let (browser, events, owned) = match self.options.debug_port {
            Some(port) => {
                let (browser, events) = connection::connect_to_browser(port).await?;
                (browser, events, false)
            }
            None => {
                let (browser, events) =
                    headless::launch_browser(self.options.headless, self.options.executable.as_deref())
                        .await?;
                (browser, events, true)
            }
        };

        Ok(ChromeBrowser {
            browser: Mutex::new(browser),
            events,
            owned,
        })
    }

    async fn open_page(&self, browser: &ChromeBrowser) -> Result<ChromePage> {
        let page = browser
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::PageCreationFailed { source: Box::new(e) })?;

        Ok(ChromePage {
            page,
            response_timeout: self.options.response_timeout,
        })
    }

    async fn close(&self, browser: &ChromeBrowser) -> Result<()> {
        if browser.owned {
            let mut inner = browser.browser.lock().await;
            inner.close().await.context("关闭浏览器失败")?;
            if let Err(e) = inner.wait().await {
                warn!("等待浏览器进程退出失败: {}", e);
            }
        }
        browser.events.abort();
        debug!("浏览器会话已关闭");
        Ok(())
    }
}

/// 一个查词页面
pub struct ChromePage {
    page: Page,
    response_timeout: Duration,
}

impl ChromePage {
    async fn element(&self, selector: &str) -> Result<Element> {
        self.page
            .find_element(selector)
            .await
            .map_err(|_| {
                BrowserError::ElementMissing {
                    selector: selector.to_string(),
                }
                .into()
            })
    }

    /// 执行 JS 并反序列化结果
    async fn eval_as<T: DeserializeOwned>(&self, script: String) -> Result<T> {
        let value = self
            .page
            .evaluate(script.as_str())
            .await
            .map_err(BrowserError::from)?
            .into_value()?;
        Ok(value)
    }
}

#[async_trait]
impl LookupPage for ChromePage {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| BrowserError::navigation_failed(url, e))?;
        debug!("已导航到: {}", url);
        Ok(())
    }

    async fn has_element(&self, selector: &str) -> Result<bool> {
        Ok(self.page.find_element(selector).await.is_ok())
    }

    async fn type_into(&self, selector: &str, text: &str) -> Result<()> {
        let input = self.element(selector).await?;
        input.click().await?;
        input.type_str(text).await?;
        Ok(())
    }

    async fn submit(&self, button_selector: &str, response_url: &str) -> Result<()> {
        // 先订阅响应事件，避免响应先于监听到达
        let mut responses = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(BrowserError::from)?;

        // 回车和点击都会提交表单，只点击按钮，保证一个词只对应一次请求
        self.element(button_selector).await?.click().await?;

        let wait = async {
            while let Some(event) = responses.next().await {
                if event.response.url.starts_with(response_url) {
                    return true;
                }
            }
            false
        };

        match tokio::time::timeout(self.response_timeout, wait).await {
            Ok(true) => Ok(()),
            Ok(false) => anyhow::bail!("页面事件流已关闭"),
            Err(_) => Err(BrowserError::ResponseTimeout {
                url: response_url.to_string(),
            }
            .into()),
        }
    }

    async fn query_blocks(&self, selector: &str) -> Result<Vec<RawBlock>> {
        let selector_json = serde_json::to_string(selector)?;
        let script = format!(
            r#"
            (() => {{
                const text = (node, sel) => {{
                    const el = node.querySelector(sel);
                    return el ? el.textContent : null;
                }};
                return Array.from(document.querySelectorAll({})).map(node => ({{
                    word: text(node, '.word'),
                    wordType: text(node, '.wordtype'),
                    translit: text(node, '.translit'),
                    translation: text(node, '.translation'),
                }}));
            }})()
            "#,
            selector_json
        );
        self.eval_as(script).await
    }

    async fn clear_input(&self, selector: &str) -> Result<()> {
        let selector_json = serde_json::to_string(selector)?;
        let script = format!(
            r#"
            (() => {{
                const el = document.querySelector({});
                if (!el) {{
                    return false;
                }}
                el.value = '';
                return true;
            }})()
            "#,
            selector_json
        );

        if self.eval_as::<bool>(script).await? {
            Ok(())
        } else {
            Err(BrowserError::ElementMissing {
                selector: selector.to_string(),
            }
            .into())
        }
    }

    async fn close(&self) -> Result<()> {
        self.page.clone().close().await.map_err(BrowserError::from)?;
        Ok(())
    }
}
