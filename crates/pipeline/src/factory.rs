//! 管道工厂：按 `pipelineType` 从声明构建管道

use crate::config::{
    COMPOSITE_PIPELINE, ENTITY_PIPELINE, PipelineConfig, PipelineEnv, TRANSFORMER_PIPELINE, require_routes,
};
use crate::error::{PipelineError, Result};
use crate::pipeline::{CompositePipeline, EntityPipeline, Pipeline, PipelineInfo, TransformerPipeline};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

type PipelineBuilder = Arc<dyn Fn(&PipelineConfig, &PipelineFactory) -> Result<Box<dyn Pipeline>> + Send + Sync>;

#[derive(Clone)]
pub struct PipelineFactory {
    env: PipelineEnv<Value>,
    builders: HashMap<String, PipelineBuilder>,
}

impl fmt::Debug for PipelineFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&String> = self.builders.keys().collect();
        types.sort();
        f.debug_struct("PipelineFactory")
            .field("env", &self.env)
            .field("types", &types)
            .finish()
    }
}

impl PipelineFactory {
    /// 预注册 transformer、entity 和 composite 三种管道
    pub fn new(env: PipelineEnv<Value>) -> Self {
        let mut factory = Self {
            env,
            builders: HashMap::new(),
        };

        factory.register(TRANSFORMER_PIPELINE, |config, factory| {
            Ok(Box::new(TransformerPipeline::configure(config, factory.env())?))
        });
        factory.register(ENTITY_PIPELINE, |config, factory| {
            Ok(Box::new(EntityPipeline::configure(config, factory.env())?))
        });
        factory.register(COMPOSITE_PIPELINE, |config, factory| {
            require_routes(config)?;
            let mut composite = CompositePipeline::new(&config.name, config.settings.clone(), config.nested);
            for route in &config.routes {
                let child = factory.build(&route.pipeline)?;
                composite = composite.with_route(PipelineInfo::configure(route, child, &factory.env().engines)?);
            }
            Ok(Box::new(composite))
        });

        factory
    }

    /// 注册自定义管道类型，同名时覆盖
    pub fn register<F>(&mut self, pipeline_type: impl Into<String>, builder: F)
    where
        F: Fn(&PipelineConfig, &PipelineFactory) -> Result<Box<dyn Pipeline>> + Send + Sync + 'static,
    {
        self.builders.insert(pipeline_type.into(), Arc::new(builder));
    }

    pub fn env(&self) -> &PipelineEnv<Value> {
        &self.env
    }

    pub fn build(&self, config: &PipelineConfig) -> Result<Box<dyn Pipeline>> {
        let builder = self
            .builders
            .get(&config.pipeline_type)
            .ok_or_else(|| PipelineError::UnknownComponent {
                kind: "管道类型",
                name: config.pipeline_type.clone(),
            })?;
        debug!(pipeline = %config.name, pipeline_type = %config.pipeline_type, "构建管道");
        builder(config, self)
    }

    pub fn build_json(&self, json: &str) -> Result<Box<dyn Pipeline>> {
        self.build(&PipelineConfig::from_json(json)?)
    }

    pub fn build_path(&self, path: impl AsRef<Path>) -> Result<Box<dyn Pipeline>> {
        self.build(&PipelineConfig::from_path(path)?)
    }
}

impl Default for PipelineFactory {
    fn default() -> Self {
        Self::new(PipelineEnv::new())
    }
}
