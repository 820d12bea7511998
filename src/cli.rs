// 命令行参数定义

use clap::{ArgAction, Parser};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// keyharvest - list every host key an SSH server will present
#[derive(Parser, Debug)]
#[command(name = "keyharvest")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Target host, optionally with a port (default port 22)
    #[arg(value_name = "HOST[:PORT]")]
    pub target: String,

    /// Comma separated list of host key algorithms to try
    #[arg(long, value_name = "ALGORITHMS")]
    pub algorithms: Option<String>,

    /// Connect and handshake timeout per algorithm, in seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Settings file (default: <config dir>/keyharvest/settings.json)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// 默认日志级别
    pub fn log_level(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            _ => tracing::Level::DEBUG,
        }
    }

    /// 日志过滤器：设置了 RUST_LOG 时以它为准，否则按 -v 次数
    pub fn log_filter(&self, rust_log: Option<&str>) -> EnvFilter {
        rust_log
            .filter(|directives| !directives.trim().is_empty())
            .and_then(|directives| EnvFilter::try_new(directives).ok())
            .unwrap_or_else(|| EnvFilter::default().add_directive(self.log_level().into()))
    }
}
