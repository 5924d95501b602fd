//! 日志初始化和格式化辅助函数

use std::path::{Path, PathBuf};

use tracing::debug;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{AppEnv, Config};

/// `LOGS_STORAGE` 只给出目录时使用的文件名，按天滚动时会追加日期
const LOG_FILE_PREFIX: &str = "word_lookup.log";

/// 把日志文件路径拆成 (目录, 文件名)
///
/// 没有目录部分时写入当前目录；以分隔符结尾的路径视为目录。
fn split_log_path(path: &str) -> (PathBuf, String) {
    if path.ends_with('/') || path.ends_with(std::path::MAIN_SEPARATOR) {
        return (PathBuf::from(path), LOG_FILE_PREFIX.to_string());
    }

    let path = Path::new(path);
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| LOG_FILE_PREFIX.to_string());

    (dir, file_name)
}

/// 初始化日志
///
/// `RUST_LOG` 优先；未设置时 dev 环境输出 debug，其余环境输出 info。
/// 配置了 `logs_storage`（日志文件路径）时额外写入按天滚动的日志文件。
///
/// # 参数
/// - `config`: 程序配置
///
/// # 返回
/// 文件日志的后台写入守卫，需要一直持有到程序退出
pub fn init(config: &Config) -> Option<WorkerGuard> {
    let default_level = match config.app_env {
        AppEnv::Dev => "debug",
        AppEnv::Test | AppEnv::Prod => "info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let (file_layer, guard) = match &config.logs_storage {
        Some(path) => {
            let (dir, file_name) = split_log_path(path);
            let appender = tracing_appender::rolling::daily(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .try_init();

    if installed.is_err() {
        debug!("日志已经初始化过，跳过");
    }

    guard
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
