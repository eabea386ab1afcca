use anyhow::Result;
use clap::Parser;

mod app;

use app::App;

/// 遥测任务处理基底 - worker守护进程
#[derive(Parser, Debug)]
#[command(name = "taskhub", disable_version_flag = true)]
#[command(about = "遥测任务处理基底：从broker拉取任务并分发给已注册的处理器")]
struct Cli {
    /// 打印版本信息并退出
    #[arg(short = 'v', long = "version")]
    version: bool,

    /// 配置文件路径 (INI格式)
    #[arg(short, long)]
    config: Option<String>,
}

fn main() -> Result<()> {
    // 错误统一以退出码1结束；-h等帮助输出按成功处理
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            std::process::exit(if e.use_stderr() { 1 } else { 0 });
        }
    };
    if cli.version {
        println!("taskhub {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let app = App::build(cli.config.as_deref())?;
    app.run()
}
