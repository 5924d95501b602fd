use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 浏览器相关错误
    #[error("浏览器错误: {0}")]
    Browser(#[from] BrowserError),
    /// 任务队列错误
    #[error("队列错误: {0}")]
    Pool(#[from] PoolError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 其他错误（用于包装第三方库错误）
    #[error("错误: {0}")]
    Other(String),
}

/// 浏览器相关错误
#[derive(Debug, Error)]
pub enum BrowserError {
    /// 启动浏览器失败
    #[error("启动浏览器失败: {source}")]
    LaunchFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 创建页面失败
    #[error("创建页面失败: {source}")]
    PageCreationFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 导航失败
    #[error("导航到 {url} 失败: {source}")]
    NavigationFailed {
        url: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 重试次数耗尽，无法创建 worker
    #[error("创建页面失败，已尝试 {attempts} 次: {last_error}")]
    SpawnExhausted { attempts: usize, last_error: String },
    /// 页面上缺少必要的元素
    #[error("页面缺少元素: {selector}")]
    ElementMissing { selector: String },
    /// 等待网络响应超时
    #[error("等待响应 {url} 超时")]
    ResponseTimeout { url: String },
    /// 执行脚本失败
    #[error("执行脚本失败: {source}")]
    ScriptExecutionFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// 任务队列错误
#[derive(Debug, Error)]
pub enum PoolError {
    /// 任务结果在送达前被丢弃
    #[error("任务结果通道已关闭")]
    ResultDropped,
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 读取配置文件失败
    #[error("读取配置文件失败 ({path}): {source}")]
    FileReadFailed {
        path: String,
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        source: toml::de::Error,
    },
    /// 配置值不合法
    #[error("配置项 {key} 不合法: {message}")]
    InvalidValue { key: String, message: String },
    /// cron 表达式不合法
    #[error("无法解析 cron 表达式 '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },
}

// ========== 从常见错误类型转换 ==========

impl From<chromiumoxide::error::CdpError> for BrowserError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        BrowserError::ScriptExecutionFailed {
            source: Box::new(err),
        }
    }
}

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AppError::Browser(err.into())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Other(format!("{:#}", err))
    }
}

// ========== 便捷构造函数 ==========

impl BrowserError {
    /// 创建浏览器启动错误
    pub fn launch_failed(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        BrowserError::LaunchFailed {
            source: Box::new(source),
        }
    }

    /// 创建导航错误
    pub fn navigation_failed(
        url: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        BrowserError::NavigationFailed {
            url: url.into(),
            source: Box::new(source),
        }
    }
}

impl ConfigError {
    /// 创建配置值错误
    pub fn invalid_value(key: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_error_display() {
        let err: AppError = BrowserError::SpawnExhausted {
            attempts: 5,
            last_error: "connection refused".to_string(),
        }
        .into();

        let text = err.to_string();
        assert!(text.starts_with("浏览器错误"));
        assert!(text.contains("5"));
        assert!(text.contains("connection refused"));
    }

    #[test]
    fn test_anyhow_into_app_error_keeps_context() {
        let err = anyhow::anyhow!("底层错误").context("外层上下文");
        let app: AppError = err.into();

        match app {
            AppError::Other(msg) => {
                assert!(msg.contains("外层上下文"));
                assert!(msg.contains("底层错误"));
            }
            other => panic!("意外的错误类型: {:?}", other),
        }
    }
}
