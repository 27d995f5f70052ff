//! recordflow 命令行入口

use anyhow::Context;
use clap::Parser;
use pipeline::cli::{Cli, CommandRunner};
use recordflow_shared::{AppConfig, observability};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load("recordflow").context("加载配置失败")?;
    observability::init(&config.observability)?;

    CommandRunner::new(config.pipeline).run(cli.command)
}
