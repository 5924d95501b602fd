use std::path::PathBuf;

use anyhow::{bail, Result};
use word_lookup::utils::logging;
use word_lookup::{App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    let (config_path, words) = parse_args(std::env::args().skip(1))?;

    // 加载配置
    let config = match config_path {
        Some(path) => Config::from_toml_file(&path)?,
        None => Config::from_env(),
    };

    // 初始化日志
    let _guard = logging::init(&config);

    // 初始化并运行应用
    App::initialize(config).await?.run(words).await?;

    Ok(())
}

/// 解析命令行：`[--config <file.toml>] <word>...`
fn parse_args(args: impl Iterator<Item = String>) -> Result<(Option<PathBuf>, Vec<String>)> {
    let mut args = args;
    let mut config_path = None;
    let mut words = Vec::new();

    while let Some(arg) = args.next() {
        if arg == "--config" {
            match args.next() {
                Some(path) => config_path = Some(PathBuf::from(path)),
                None => bail!("--config 需要一个文件路径"),
            }
        } else {
            words.push(arg);
        }
    }

    Ok((config_path, words))
}
