use super::Pipeline;
use super::persistence::PersistencePipeline;
use crate::config::{PipelineConfig, PipelineEnv, PipelineSettings};
use crate::context::Context;
use crate::error::Result;
use crate::mapping::{Entity, JSON_MAPPER};
use crate::response::RecordResponse;
use crate::source::SourceMap;
use serde_json::Value;

/// 类型化实体管道，必须声明 mapper
#[derive(Debug)]
pub struct EntityPipeline<E> {
    inner: PersistencePipeline<E>,
}

impl<E: Entity> EntityPipeline<E> {
    pub fn new(inner: PersistencePipeline<E>) -> Self {
        Self { inner }
    }

    pub fn configure(config: &PipelineConfig, env: &PipelineEnv<E>) -> Result<Self> {
        Ok(Self::new(PersistencePipeline::configure(config, env, None)?))
    }

    pub fn persistence(&mut self) -> &mut PersistencePipeline<E> {
        &mut self.inner
    }
}

impl<E: Entity> Pipeline for EntityPipeline<E> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn settings(&self) -> &PipelineSettings {
        self.inner.settings()
    }

    fn process(&mut self, source: SourceMap, context: &mut Context) -> Result<RecordResponse> {
        self.inner.process_record(source, context)
    }
}

/// 以 JSON 对象为实体的转换管道，mapper 缺省为 json
#[derive(Debug)]
pub struct TransformerPipeline {
    inner: PersistencePipeline<Value>,
}

impl TransformerPipeline {
    pub fn new(inner: PersistencePipeline<Value>) -> Self {
        Self { inner }
    }

    pub fn configure(config: &PipelineConfig, env: &PipelineEnv<Value>) -> Result<Self> {
        Ok(Self::new(PersistencePipeline::configure(
            config,
            env,
            Some(JSON_MAPPER),
        )?))
    }

    pub fn persistence(&mut self) -> &mut PersistencePipeline<Value> {
        &mut self.inner
    }
}

impl Pipeline for TransformerPipeline {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn settings(&self) -> &PipelineSettings {
        self.inner.settings()
    }

    fn process(&mut self, source: SourceMap, context: &mut Context) -> Result<RecordResponse> {
        self.inner.process_record(source, context)
    }
}
