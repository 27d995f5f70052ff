//! 记录处理上下文
//!
//! 与记录一起传递给映射和子管道。组合管道把它当作路径求值和实体回填的工作文档。

use crate::source::SourceMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    values: Map<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// 合并记录字段，同名键以记录为准
    pub fn merge(&mut self, source: &SourceMap) {
        for (key, value) in source {
            self.values.insert(key.clone(), value.clone());
        }
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.values.clone())
    }
}

impl From<SourceMap> for Context {
    fn from(values: SourceMap) -> Self {
        Self { values }
    }
}
