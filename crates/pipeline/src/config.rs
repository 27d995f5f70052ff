//! 管道声明与构建环境

use crate::error::{PipelineError, Result};
use crate::mapping::{Entity, MappedResponse, MapperFactory};
use crate::source::SourceMap;
use crate::store::DataStoreFactory;
use rule_engine::{ExpressionEngines, RuleConfig, RuleConfigReader, RuleEnv, RuleVisitor, RulesCache};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

pub const TRANSFORMER_PIPELINE: &str = "transformer";
pub const ENTITY_PIPELINE: &str = "entity";
pub const COMPOSITE_PIPELINE: &str = "composite";

fn default_true() -> bool {
    true
}

fn default_pipeline_type() -> String {
    TRANSFORMER_PIPELINE.to_string()
}

/// 管道级别的处理策略
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSettings {
    /// true：校验错误立即中止；false：收集错误后继续
    #[serde(default = "default_true")]
    pub terminate_on_validation_error: bool,
    /// 是否为每个收集到的校验错误写入一条错误记录
    #[serde(default)]
    pub save_validation_errors: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            terminate_on_validation_error: true,
            save_validation_errors: false,
            entity_type: None,
        }
    }
}

/// 管道声明
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    pub name: String,
    #[serde(default = "default_pipeline_type")]
    pub pipeline_type: String,
    #[serde(default)]
    pub settings: PipelineSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapper: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<String>,
    /// 映射前的准入过滤规则
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<RuleConfig>,
    /// 映射后的处理规则
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<RuleConfig>>,
    /// 组合管道：路由是否嵌套执行
    #[serde(default)]
    pub nested: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<RouteConfig>,
}

impl PipelineConfig {
    pub fn new(name: impl Into<String>, pipeline_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pipeline_type: pipeline_type.into(),
            settings: PipelineSettings::default(),
            mapper: None,
            store: None,
            filters: Vec::new(),
            rules: None,
            nested: false,
            routes: Vec::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// 实体类型，未配置时使用管道名称
    pub fn entity_type(&self) -> &str {
        self.settings.entity_type.as_deref().unwrap_or(&self.name)
    }

    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_mapper(mut self, mapper: impl Into<String>) -> Self {
        self.mapper = Some(mapper.into());
        self
    }

    pub fn with_store(mut self, store: impl Into<String>) -> Self {
        self.store = Some(store.into());
        self
    }

    pub fn with_filters(mut self, filters: Vec<RuleConfig>) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_rules(mut self, rules: Vec<RuleConfig>) -> Self {
        self.rules = Some(rules);
        self
    }

    pub fn with_nested(mut self, nested: bool) -> Self {
        self.nested = nested;
        self
    }

    pub fn with_route(mut self, route: RouteConfig) -> Self {
        self.routes.push(route);
        self
    }
}

/// 组合管道的路由声明
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteConfig {
    pub pipeline: PipelineConfig,
    /// JSONPath 表达式
    pub path_expression: String,
    /// 对每个匹配项求值的谓词表达式
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_predicate: Option<String>,
    #[serde(default)]
    pub ignorable: bool,
    #[serde(default)]
    pub reset_context: bool,
    #[serde(default)]
    pub add_to_context: bool,
    /// 回填上下文的键，缺省使用子管道名称
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_key: Option<String>,
}

impl RouteConfig {
    pub fn new(path_expression: impl Into<String>, pipeline: PipelineConfig) -> Self {
        Self {
            pipeline,
            path_expression: path_expression.into(),
            filter_predicate: None,
            ignorable: false,
            reset_context: false,
            add_to_context: false,
            context_key: None,
        }
    }

    pub fn with_filter_predicate(mut self, predicate: impl Into<String>) -> Self {
        self.filter_predicate = Some(predicate.into());
        self
    }

    pub fn ignorable(mut self) -> Self {
        self.ignorable = true;
        self
    }

    pub fn reset_context(mut self) -> Self {
        self.reset_context = true;
        self
    }

    pub fn add_to_context(mut self, key: Option<&str>) -> Self {
        self.add_to_context = true;
        self.context_key = key.map(str::to_string);
        self
    }
}

/// 管道构建环境：映射器、数据存储、表达式引擎和共享规则
///
/// 引用规则的解析顺序：显式注册的规则缓存，其次是共享规则声明。
/// 共享规则按引用它的管道的实体类型和设置构建，组合管道的每个子管道各自一份。
pub struct PipelineEnv<E> {
    pub mappers: MapperFactory<E>,
    pub stores: DataStoreFactory,
    pub engines: ExpressionEngines,
    pub visitor: Option<Arc<RuleVisitor>>,
    /// 处理规则中引用规则的来源
    pub entity_rules: Option<RulesCache<MappedResponse<E>>>,
    /// 过滤规则中引用规则的来源
    pub source_rules: Option<RulesCache<SourceMap>>,
    /// 未注册缓存时，按管道构建的共享规则声明
    pub shared_rules: Vec<RuleConfig>,
}

impl<E> Clone for PipelineEnv<E> {
    fn clone(&self) -> Self {
        Self {
            mappers: self.mappers.clone(),
            stores: self.stores.clone(),
            engines: self.engines.clone(),
            visitor: self.visitor.clone(),
            entity_rules: self.entity_rules.clone(),
            source_rules: self.source_rules.clone(),
            shared_rules: self.shared_rules.clone(),
        }
    }
}

impl<E> fmt::Debug for PipelineEnv<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineEnv")
            .field("mappers", &self.mappers)
            .field("stores", &self.stores)
            .field("engines", &self.engines)
            .field("entity_rules", &self.entity_rules)
            .field("source_rules", &self.source_rules)
            .field("shared_rules", &self.shared_rules.len())
            .finish()
    }
}

impl<E: Entity> PipelineEnv<E> {
    pub fn new() -> Self {
        Self {
            mappers: MapperFactory::new(),
            stores: DataStoreFactory::new(),
            engines: ExpressionEngines::new(),
            visitor: None,
            entity_rules: None,
            source_rules: None,
            shared_rules: Vec::new(),
        }
    }
}

impl<E: Entity> Default for PipelineEnv<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> PipelineEnv<E> {
    pub fn with_mappers(mut self, mappers: MapperFactory<E>) -> Self {
        self.mappers = mappers;
        self
    }

    pub fn with_stores(mut self, stores: DataStoreFactory) -> Self {
        self.stores = stores;
        self
    }

    pub fn with_engines(mut self, engines: ExpressionEngines) -> Self {
        self.engines = engines;
        self
    }

    pub fn with_visitor(mut self, visitor: Arc<RuleVisitor>) -> Self {
        self.visitor = Some(visitor);
        self
    }

    pub fn with_entity_rules(mut self, cache: RulesCache<MappedResponse<E>>) -> Self {
        self.entity_rules = Some(cache);
        self
    }

    pub fn with_source_rules(mut self, cache: RulesCache<SourceMap>) -> Self {
        self.source_rules = Some(cache);
        self
    }

    pub fn with_shared_rules(mut self, rules: Vec<RuleConfig>) -> Self {
        self.shared_rules = rules;
        self
    }

    /// 规则构建环境，校验错误策略取自管道设置
    pub fn rule_env(&self, entity_type: &str, settings: &PipelineSettings) -> RuleEnv {
        let env = RuleEnv::new(entity_type)
            .with_engines(self.engines.clone())
            .with_terminate_on_validation_error(settings.terminate_on_validation_error);
        match &self.visitor {
            Some(visitor) => env.with_visitor(visitor.clone()),
            None => env,
        }
    }

    pub fn entity_reader(
        &self,
        entity_type: &str,
        settings: &PipelineSettings,
    ) -> Result<RuleConfigReader<MappedResponse<E>>> {
        self.reader(self.entity_rules.as_ref(), entity_type, settings)
    }

    pub fn source_reader(&self, entity_type: &str, settings: &PipelineSettings) -> Result<RuleConfigReader<SourceMap>> {
        self.reader(self.source_rules.as_ref(), entity_type, settings)
    }

    fn reader<T>(
        &self,
        cache: Option<&RulesCache<T>>,
        entity_type: &str,
        settings: &PipelineSettings,
    ) -> Result<RuleConfigReader<T>> {
        let env = self.rule_env(entity_type, settings);
        let reader = RuleConfigReader::new(env.clone());
        if let Some(cache) = cache {
            return Ok(reader.with_cache(cache.clone()));
        }
        if self.shared_rules.is_empty() {
            return Ok(reader);
        }

        let cache = RulesCache::new(entity_type);
        cache.load(&self.shared_rules, &env)?;
        Ok(reader.with_cache(cache))
    }
}

/// 组合管道至少需要一个路由
pub(crate) fn require_routes(config: &PipelineConfig) -> Result<()> {
    if config.routes.is_empty() {
        return Err(PipelineError::Configuration(format!(
            "组合管道 '{}' 没有配置路由",
            config.name
        )));
    }
    Ok(())
}
