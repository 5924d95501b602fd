use anyhow::{Context, Result};
use tracing::info;

use crate::browser::{ChromeBackend, ChromeOptions};
use crate::config::Config;
use crate::translator::Translator;
use crate::utils::logging::truncate_text;

/// 应用主结构
pub struct App {
    config: Config,
    translator: Translator<ChromeBackend>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        config.validate()?;
        log_startup(&config);

        let backend = ChromeBackend::new(ChromeOptions::from_config(&config));
        let translator = Translator::new(backend, &config)?;

        Ok(Self { config, translator })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn translator(&self) -> &Translator<ChromeBackend> {
        &self.translator
    }

    /// 查询并把结果以 JSON 打印到标准输出
    pub async fn run(&self, words: Vec<String>) -> Result<()> {
        if words.is_empty() {
            info!("⚠️ 没有需要查询的词，程序结束");
            return Ok(());
        }

        info!("🔍 查询: {}", truncate_text(&words.join(", "), 80));
        let data = self.translator.lookup(words).await?;

        let found = data.values().filter(|entries| !entries.is_empty()).count();
        info!("✅ 查询完成: {}/{} 个词有释义", found, data.len());

        let json = serde_json::to_string_pretty(&data).context("序列化查询结果失败")?;
        println!("{}", json);

        Ok(())
    }
}

fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 词典查询模式");
    info!("📊 最大页面数: {}", config.max_workers);
    info!("🌐 词典地址: {}", config.target_url);
    info!("{}", "=".repeat(60));
}
