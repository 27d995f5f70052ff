//! 可执行管道：准入过滤、映射与映射后规则处理

use crate::config::{PipelineConfig, PipelineEnv, PipelineSettings};
use crate::context::Context;
use crate::error::{PipelineError, Result};
use crate::mapping::{Entity, MappedResponse, Mapping};
use crate::source::SourceMap;
use rule_engine::{FilterChain, RulesExecutor};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

pub struct ExecutablePipeline<E> {
    name: String,
    settings: PipelineSettings,
    entity_type: String,
    mapping: Arc<dyn Mapping<E>>,
    filters: Option<FilterChain<SourceMap>>,
    rules: Option<RulesExecutor<MappedResponse<E>>>,
}

impl<E> fmt::Debug for ExecutablePipeline<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutablePipeline")
            .field("name", &self.name)
            .field("entity_type", &self.entity_type)
            .field("mapping", &self.mapping.name())
            .field("filters", &self.filters.as_ref().map(|f| f.rules().len()))
            .field("rules", &self.rules.as_ref().map(|r| r.rules().len()))
            .finish()
    }
}

impl<E: Entity> ExecutablePipeline<E> {
    pub fn new(name: impl Into<String>, settings: PipelineSettings, mapping: Arc<dyn Mapping<E>>) -> Self {
        let name = name.into();
        let entity_type = settings.entity_type.clone().unwrap_or_else(|| name.clone());
        Self {
            name,
            settings,
            entity_type,
            mapping,
            filters: None,
            rules: None,
        }
    }

    pub fn with_filters(mut self, filters: FilterChain<SourceMap>) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn with_rules(mut self, rules: RulesExecutor<MappedResponse<E>>) -> Self {
        self.rules = Some(rules);
        self
    }

    /// 从声明构建；`default_mapper` 用于未声明 mapper 的管道
    pub fn configure(config: &PipelineConfig, env: &PipelineEnv<E>, default_mapper: Option<&str>) -> Result<Self> {
        let mapper = config
            .mapper
            .as_deref()
            .or(default_mapper)
            .ok_or_else(|| PipelineError::Configuration(format!("管道 '{}' 缺少 mapper", config.name)))?;
        let mut pipeline = Self::new(&config.name, config.settings.clone(), env.mappers.get(mapper)?);

        let entity_type = config.entity_type();
        if !config.filters.is_empty() {
            let reader = env.source_reader(entity_type, &config.settings)?;
            pipeline = pipeline.with_filters(FilterChain::configure(&config.filters, &reader)?);
        }
        if let Some(rules) = &config.rules {
            let reader = env.entity_reader(entity_type, &config.settings)?;
            pipeline = pipeline.with_rules(RulesExecutor::configure(rules, &reader)?);
        }

        Ok(pipeline)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// 准入检查，未配置过滤规则时总是通过
    pub fn admit(&self, source: &mut SourceMap) -> Result<bool> {
        match &self.filters {
            Some(filters) => Ok(filters.admits(source)?),
            None => Ok(true),
        }
    }

    /// 映射并执行处理规则，规则结果覆盖映射状态（映射阶段的错误保留在前）
    pub fn map(&self, source: &SourceMap, context: &Context) -> Result<MappedResponse<E>> {
        let mut mapped = self.mapping.read(source, context)?;

        if let Some(rules) = &self.rules {
            let mut status = rules.evaluate(&mut mapped)?;
            let mapping_errors = std::mem::take(&mut mapped.status.errors);
            if !mapping_errors.is_empty() {
                status.errors.splice(0..0, mapping_errors);
                status.finalize();
            }
            debug!(pipeline = %self.name, status = %status.status, errors = status.errors.len(), "处理规则执行完成");
            mapped.status = status;
        }

        Ok(mapped)
    }
}
