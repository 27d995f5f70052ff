//! 记录映射
//!
//! [`Mapping`] 将一条原始记录转换为实体。具体的字段映射语言由外部提供，
//! 这里只内置基于 serde 往返的 [`JsonMapping`]。

use crate::context::Context;
use crate::error::{PipelineError, Result};
use crate::source::SourceMap;
use rule_engine::{EvaluationStatus, RuleTarget};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// 默认映射器名称
pub const JSON_MAPPER: &str = "json";

/// 可被管道处理的实体类型
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> Entity for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// 映射结果
#[derive(Debug, Clone, PartialEq)]
pub struct MappedResponse<E> {
    pub source: SourceMap,
    pub entity: E,
    pub status: EvaluationStatus,
}

impl<E> MappedResponse<E> {
    pub fn new(source: SourceMap, entity: E) -> Self {
        Self {
            source,
            entity,
            status: EvaluationStatus::success(),
        }
    }
}

/// 后处理规则直接作用于实体
impl<E: Entity> RuleTarget for MappedResponse<E> {
    fn bindings(&self) -> serde_json::Result<Value> {
        serde_json::to_value(&self.entity)
    }

    fn apply_bindings(&mut self, bindings: Value) -> serde_json::Result<()> {
        self.entity = serde_json::from_value(bindings)?;
        Ok(())
    }
}

pub trait Mapping<E>: Send + Sync {
    fn name(&self) -> &str;

    fn read(&self, source: &SourceMap, context: &Context) -> Result<MappedResponse<E>>;
}

/// 以 serde 反序列化原始记录得到实体
pub struct JsonMapping<E> {
    _entity: PhantomData<fn() -> E>,
}

impl<E> JsonMapping<E> {
    pub fn new() -> Self {
        Self {
            _entity: PhantomData,
        }
    }
}

impl<E> Default for JsonMapping<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> Mapping<E> for JsonMapping<E> {
    fn name(&self) -> &str {
        JSON_MAPPER
    }

    fn read(&self, source: &SourceMap, _context: &Context) -> Result<MappedResponse<E>> {
        let entity = serde_json::from_value(Value::Object(source.clone())).map_err(|e| {
            PipelineError::Mapping {
                mapper: JSON_MAPPER.to_string(),
                message: e.to_string(),
            }
        })?;
        Ok(MappedResponse::new(source.clone(), entity))
    }
}

/// 映射器注册表
pub struct MapperFactory<E> {
    mappers: HashMap<String, Arc<dyn Mapping<E>>>,
}

impl<E> Clone for MapperFactory<E> {
    fn clone(&self) -> Self {
        Self {
            mappers: self.mappers.clone(),
        }
    }
}

impl<E> fmt::Debug for MapperFactory<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.mappers.keys().collect();
        names.sort();
        f.debug_struct("MapperFactory").field("mappers", &names).finish()
    }
}

impl<E: Entity> MapperFactory<E> {
    /// 预注册 json 映射器
    pub fn new() -> Self {
        let mut factory = Self::empty();
        factory.register(Arc::new(JsonMapping::<E>::new()));
        factory
    }
}

impl<E: Entity> Default for MapperFactory<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> MapperFactory<E> {
    pub fn empty() -> Self {
        Self {
            mappers: HashMap::new(),
        }
    }

    pub fn register(&mut self, mapping: Arc<dyn Mapping<E>>) {
        self.mappers.insert(mapping.name().to_string(), mapping);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Mapping<E>>> {
        self.mappers
            .get(name)
            .cloned()
            .ok_or_else(|| PipelineError::UnknownComponent {
                kind: "映射器",
                name: name.to_string(),
            })
    }
}
