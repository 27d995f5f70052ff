//! 测试环境
//!
//! 每个测试独立的临时目录和内存存储，管道定义和输入文件都写入临时目录。

use pipeline::{InMemoryStore, Pipeline, PipelineConfig, PipelineEnv, PipelineFactory};
use rule_engine::RuleConfig;
use serde_json::Value;
use std::path::PathBuf;
use tempfile::TempDir;

/// 端到端测试使用的存储名称
pub const STORE: &str = "e2e";

pub struct TestEnvironment {
    dir: TempDir,
    pub store: InMemoryStore,
    shared_rules: Vec<RuleConfig>,
}

impl TestEnvironment {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
            store: InMemoryStore::new(),
            shared_rules: Vec::new(),
        })
    }

    pub fn with_shared_rules(mut self, rules: Vec<RuleConfig>) -> Self {
        self.shared_rules = rules;
        self
    }

    /// 构建管道，实体写入本环境的存储
    pub fn build(&self, config: &PipelineConfig) -> anyhow::Result<Box<dyn Pipeline>> {
        let mut env = PipelineEnv::new().with_shared_rules(self.shared_rules.clone());
        env.stores.register_memory(STORE, self.store.clone());

        Ok(PipelineFactory::new(env).build(config)?)
    }

    /// 写入 JSON 文件
    pub fn write_json(&self, name: &str, value: &Value) -> anyhow::Result<PathBuf> {
        let path = self.dir.path().join(name);
        std::fs::write(&path, serde_json::to_string_pretty(value)?)?;
        Ok(path)
    }

    pub fn write_text(&self, name: &str, content: &str) -> anyhow::Result<PathBuf> {
        let path = self.dir.path().join(name);
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// 写入 JSON Lines 文件，每个值一行
    pub fn write_lines(&self, name: &str, records: &[Value]) -> anyhow::Result<PathBuf> {
        let path = self.dir.path().join(name);
        let mut content = String::new();
        for record in records {
            content.push_str(&serde_json::to_string(record)?);
            content.push('\n');
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }
}
