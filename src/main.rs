// keyharvest - SSH 主机密钥采集工具
// 应用入口

use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

mod cli;
mod constants;
mod harvest;
mod models;
mod output;
mod services;
mod ssh;

use cli::Cli;
use harvest::Harvester;
use models::Target;
use services::storage;
use ssh::SshProbeClient;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // 初始化日志系统
    // 设置了 RUST_LOG 时以它为准，例如：RUST_LOG=debug keyharvest host
    // 否则按 -v 次数决定级别（默认 warn）
    // 日志写到 stderr，stdout 只输出结果
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(cli.log_filter(rust_log.as_deref()))
        .with_target(false) // 不显示 target（模块路径）
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    // 配置优先级：命令行 > 设置文件 > 内置默认值
    let mut settings = storage::load_settings(cli.config.as_deref())?;
    if let Some(list) = &cli.algorithms {
        settings.set_algorithms_csv(list);
    }
    if let Some(seconds) = cli.timeout {
        settings.connect_timeout = seconds;
    }
    if settings.algorithms.is_empty() {
        bail!("No host key algorithms to probe");
    }

    let target = Target::parse(&cli.target)
        .with_context(|| format!("Failed to parse target: {}", cli.target))?;

    // 探测严格串行，单线程运行时即可
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create Tokio runtime")?;

    let client = SshProbeClient::new(settings.connect_timeout);
    let result = runtime.block_on(Harvester::new(client).run(&target, &settings.algorithms));

    match result.into_keys() {
        Ok(keys) => {
            print!("{}", output::render_keys(&keys)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            eprintln!("{}", output::render_failure(&err));
            Ok(ExitCode::FAILURE)
        }
    }
}
