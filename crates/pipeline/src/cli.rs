//! 命令行接口
//!
//! - `run`   按管道定义读取 JSON Lines 输入并输出处理汇总
//! - `check` 只构建管道，用于校验定义和规则能否通过编译
//!
//! ```bash
//! recordflow run -p orders.json -i orders.jsonl --shared-rules rules.json
//! cat orders.jsonl | recordflow run -p orders.json --verbose
//! recordflow check -p orders.json
//! ```
//!
//! 未在命令行指定的路径取自配置文件 `[pipeline]` 段或 `RECORDFLOW_PIPELINE__*` 环境变量。

use crate::config::{PipelineConfig, PipelineEnv};
use crate::context::Context;
use crate::error::PipelineError;
use crate::factory::PipelineFactory;
use crate::pipeline::Pipeline;
use crate::response::ReadResponse;
use crate::source::JsonLinesReader;
use anyhow::{Context as _, Result, anyhow};
use clap::{Parser, Subcommand};
use recordflow_shared::config::PipelineRunConfig;
use rule_engine::{RuleConfig, RulesCache};
use serde_json::{Value, json};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "recordflow")]
#[command(version, about = "基于规则的记录转换与持久化管道")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 执行管道
    Run {
        /// 管道定义文件（JSON）
        #[arg(short, long)]
        pipeline: Option<PathBuf>,

        /// 输入文件（JSON Lines），缺省读取标准输入
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// 供引用规则使用的共享规则文件（JSON 数组）
        #[arg(long)]
        shared_rules: Option<PathBuf>,

        /// 输出每条记录的处理结果
        #[arg(short, long)]
        verbose: bool,
    },

    /// 校验管道定义
    Check {
        #[arg(short, long)]
        pipeline: Option<PathBuf>,

        #[arg(long)]
        shared_rules: Option<PathBuf>,
    },
}

/// 命令执行器，命令行参数优先于配置文件
pub struct CommandRunner {
    defaults: PipelineRunConfig,
}

impl CommandRunner {
    pub fn new(defaults: PipelineRunConfig) -> Self {
        Self { defaults }
    }

    pub fn run(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Run {
                pipeline,
                input,
                shared_rules,
                verbose,
            } => {
                let definition = self.definition(pipeline)?;
                let shared_rules = shared_rules.or_else(|| self.defaults.shared_rules.clone());
                let input = input.or_else(|| self.defaults.input.clone());
                let summary = run_pipeline(&definition, shared_rules.as_deref(), input.as_deref(), verbose)?;
                println!("{}", serde_json::to_string_pretty(&summary)?);
                Ok(())
            }
            Commands::Check {
                pipeline,
                shared_rules,
            } => {
                let definition = self.definition(pipeline)?;
                let shared_rules = shared_rules.or_else(|| self.defaults.shared_rules.clone());
                let config = PipelineConfig::from_path(&definition)
                    .with_context(|| format!("无法读取管道定义 {}", definition.display()))?;
                let factory = PipelineFactory::new(build_env(&config, shared_rules.as_deref())?);
                let pipeline = factory.build(&config)?;
                info!(pipeline = pipeline.name(), "管道定义有效");
                println!("{}", json!({"pipeline": pipeline.name(), "valid": true}));
                Ok(())
            }
        }
    }

    fn definition(&self, pipeline: Option<PathBuf>) -> Result<PathBuf> {
        pipeline
            .or_else(|| self.defaults.definition.clone())
            .ok_or_else(|| anyhow!("未指定管道定义文件（--pipeline 或 pipeline.definition）"))
    }
}

/// 构建管道环境
///
/// 共享规则先按顶层管道校验一遍，之后由每个引用它们的管道按自身的实体类型和设置构建，
/// 处理规则和过滤规则都可以引用。
pub fn build_env(config: &PipelineConfig, shared_rules: Option<&Path>) -> Result<PipelineEnv<Value>> {
    let env = PipelineEnv::new();
    let Some(path) = shared_rules else {
        return Ok(env);
    };

    let content = std::fs::read_to_string(path).with_context(|| format!("无法读取共享规则 {}", path.display()))?;
    let configs: Vec<RuleConfig> =
        serde_json::from_str(&content).with_context(|| format!("共享规则格式错误 {}", path.display()))?;

    let entity_type = config.entity_type();
    let loaded = RulesCache::<Value>::new(entity_type)
        .load(&configs, &env.rule_env(entity_type, &config.settings))
        .with_context(|| format!("共享规则无效 {}", path.display()))?;
    info!(count = loaded.len(), path = %path.display(), "共享规则已加载");

    Ok(env.with_shared_rules(configs))
}

/// 执行管道并生成汇总；读取中止或中断时先把已处理部分的汇总写到标准错误，随后报错
pub fn run_pipeline(
    definition: &Path,
    shared_rules: Option<&Path>,
    input: Option<&Path>,
    verbose: bool,
) -> Result<Value> {
    let config = PipelineConfig::from_path(definition)
        .with_context(|| format!("无法读取管道定义 {}", definition.display()))?;
    let factory = PipelineFactory::new(build_env(&config, shared_rules)?);
    let mut pipeline = factory.build(&config)?;

    let mut reader = match input {
        Some(path) => JsonLinesReader::from_path(path),
        None => JsonLinesReader::from_reader(BufReader::new(io::stdin())),
    };

    let mut context = Context::new();
    match pipeline.read_from(&mut reader, &mut context) {
        Ok(response) => Ok(summary(pipeline.name(), &response, verbose)),
        Err(PipelineError::Aborted { response, cause }) => {
            warn!(pipeline = pipeline.name(), "管道因校验错误中止");
            eprintln!("{}", serde_json::to_string_pretty(&summary(pipeline.name(), &response, verbose))?);
            Err(anyhow!("管道 '{}' 中止: {cause}", pipeline.name()))
        }
        Err(PipelineError::Failed { response, cause }) => {
            warn!(pipeline = pipeline.name(), "管道因错误中断");
            eprintln!("{}", serde_json::to_string_pretty(&summary(pipeline.name(), &response, verbose))?);
            Err(anyhow!("管道 '{}' 中断: {cause}", pipeline.name()))
        }
        Err(e) => Err(e.into()),
    }
}

pub fn summary(pipeline: &str, response: &ReadResponse, verbose: bool) -> Value {
    let mut summary = json!({
        "pipeline": pipeline,
        "recordCount": response.record_count,
        "commitCount": response.commit_count,
        "errorCount": response.error_count(),
        "ignoredCount": response.ignored_count(),
    });
    if verbose {
        summary["records"] = serde_json::to_value(&response.records).unwrap_or(Value::Null);
    }
    summary
}
