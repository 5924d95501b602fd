use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::cache::parse_rotation_schedule;
use crate::error::ConfigError;

/// 运行环境
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppEnv {
    #[default]
    Dev,
    Test,
    Prod,
}

impl AppEnv {
    /// 解析运行环境，无法识别的值一律视为 dev
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "test" => AppEnv::Test,
            "prod" => AppEnv::Prod,
            _ => AppEnv::Dev,
        }
    }
}

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 同时存在的浏览器页面数量上限
    pub max_workers: usize,
    /// 空闲页面回收时间（秒）
    pub worker_expires_after_secs: u64,
    /// 创建页面的最大尝试次数
    pub spawn_attempts: usize,
    /// 两次尝试之间的等待时间（毫秒）
    pub spawn_retry_delay_ms: u64,
    /// 查词缓存每层的最大条目数
    pub cache_max_size: usize,
    /// 缓存条目过期时间（秒），为空表示不过期
    pub cache_timeout_secs: Option<u64>,
    /// 整体清空缓存的 cron 表达式
    pub cache_rotation: Option<String>,
    /// 词典页面 URL
    pub target_url: String,
    /// 查询结果对应的网络请求 URL
    pub response_url: String,
    /// 等待查询响应的超时时间（秒）
    pub response_timeout_secs: u64,
    /// 浏览器调试端口，设置后连接已有浏览器而不是启动新的
    pub browser_debug_port: Option<u16>,
    /// 浏览器可执行文件路径
    pub chrome_executable: Option<String>,
    /// 是否以无头模式启动
    pub headless: bool,
    /// 运行环境
    pub app_env: AppEnv,
    /// 日志文件路径，为空表示只输出到终端
    pub logs_storage: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_workers: 1,
            worker_expires_after_secs: 120,
            spawn_attempts: 5,
            spawn_retry_delay_ms: 500,
            cache_max_size: 500,
            cache_timeout_secs: None,
            cache_rotation: None,
            target_url: "https://www.slovar.co.il/translate.php".to_string(),
            response_url: "https://www.slovar.co.il/txajax.php".to_string(),
            response_timeout_secs: 15,
            browser_debug_port: None,
            chrome_executable: None,
            headless: true,
            app_env: AppEnv::Dev,
            logs_storage: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_workers: env_parse("MAX_WORKERS").unwrap_or(default.max_workers),
            worker_expires_after_secs: env_parse("WORKER_EXPIRES_AFTER_SECS").unwrap_or(default.worker_expires_after_secs),
            spawn_attempts: env_parse("SPAWN_ATTEMPTS").unwrap_or(default.spawn_attempts),
            spawn_retry_delay_ms: env_parse("SPAWN_RETRY_DELAY_MS").unwrap_or(default.spawn_retry_delay_ms),
            cache_max_size: env_parse("CACHE_MAX_SIZE").unwrap_or(default.cache_max_size),
            cache_timeout_secs: env_parse("CACHE_TIMEOUT_SECS").or(default.cache_timeout_secs),
            cache_rotation: std::env::var("CACHE_ROTATION").ok().or(default.cache_rotation),
            target_url: std::env::var("TARGET_URL").unwrap_or(default.target_url),
            response_url: std::env::var("RESPONSE_URL").unwrap_or(default.response_url),
            response_timeout_secs: env_parse("RESPONSE_TIMEOUT_SECS").unwrap_or(default.response_timeout_secs),
            browser_debug_port: env_parse("BROWSER_DEBUG_PORT").or(default.browser_debug_port),
            chrome_executable: std::env::var("CHROME_EXECUTABLE").ok().or(default.chrome_executable),
            headless: env_parse("HEADLESS").unwrap_or(default.headless),
            app_env: std::env::var("APP_ENV").map(|v| AppEnv::parse(&v)).unwrap_or(default.app_env),
            logs_storage: std::env::var("LOGS_STORAGE").ok().or(default.logs_storage),
        }
    }

    /// 从 TOML 文件加载配置，缺失的字段使用默认值
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadFailed {
            path: display.clone(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::TomlParseFailed {
            path: display,
            source,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// 检查配置是否合法
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::invalid_value("max_workers", "至少需要 1 个 worker"));
        }
        if self.spawn_attempts == 0 {
            return Err(ConfigError::invalid_value("spawn_attempts", "至少需要尝试 1 次"));
        }
        if self.cache_max_size == 0 {
            return Err(ConfigError::invalid_value("cache_max_size", "缓存容量至少为 1"));
        }
        if let Some(expression) = &self.cache_rotation {
            parse_rotation_schedule(expression)?;
        }
        Ok(())
    }

    pub fn worker_expires_after(&self) -> Duration {
        Duration::from_secs(self.worker_expires_after_secs)
    }

    pub fn spawn_retry_delay(&self) -> Duration {
        Duration::from_millis(self.spawn_retry_delay_ms)
    }

    pub fn cache_timeout(&self) -> Option<Duration> {
        self.cache_timeout_secs.map(Duration::from_secs)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }
}

/// 读取并解析环境变量，解析失败时记录警告并返回 None
fn env_parse<T: FromStr>(var_name: &str) -> Option<T> {
    let value = std::env::var(var_name).ok()?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            let err = ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type: std::any::type_name::<T>().to_string(),
            };
            tracing::warn!("{}，使用默认值", err);
            None
        }
    }
}
