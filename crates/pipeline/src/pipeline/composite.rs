//! 组合管道
//!
//! 每个路由用 JSONPath 从工作文档（上下文 + 源记录）中抽取子记录，交给子管道处理。
//! - 串行模式：各路由依次对同一工作文档求值，可把实体回填到工作文档
//! - 嵌套模式：路由 i 的每个匹配项合并到上下文后作为路由 i+1 的工作文档，深度优先

use super::Pipeline;
use crate::config::{PipelineSettings, RouteConfig};
use crate::context::Context;
use crate::error::{PipelineError, Result};
use crate::response::RecordResponse;
use crate::source::SourceMap;
use rule_engine::{
    CompiledExpression, ExpressionEngines, ExpressionError, RuleError, RuleEvaluationError, RuleKind,
};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// 非对象匹配项包装时使用的字段名
pub const VALUE_FIELD: &str = "value";

/// 组合管道的一个路由
pub struct PipelineInfo {
    pipeline: Box<dyn Pipeline>,
    path_expression: String,
    filter_predicate: Option<Arc<dyn CompiledExpression>>,
    ignorable: bool,
    reset_context: bool,
    add_to_context: bool,
    context_key: String,
}

impl fmt::Debug for PipelineInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineInfo")
            .field("pipeline", &self.pipeline.name())
            .field("path_expression", &self.path_expression)
            .field("filter_predicate", &self.filter_predicate.as_ref().map(|p| p.source()))
            .field("ignorable", &self.ignorable)
            .field("reset_context", &self.reset_context)
            .field("add_to_context", &self.add_to_context)
            .field("context_key", &self.context_key)
            .finish()
    }
}

fn predicate_error(path: &str, source: ExpressionError) -> PipelineError {
    PipelineError::Rule(
        RuleEvaluationError::Expression {
            rule: path.to_string(),
            source,
        }
        .into(),
    )
}

fn into_source(value: Value) -> SourceMap {
    match value {
        Value::Object(map) => map,
        other => SourceMap::from_iter([(VALUE_FIELD.to_string(), other)]),
    }
}

impl PipelineInfo {
    pub fn new(path_expression: impl Into<String>, pipeline: Box<dyn Pipeline>) -> Self {
        let context_key = pipeline.name().to_string();
        Self {
            pipeline,
            path_expression: path_expression.into(),
            filter_predicate: None,
            ignorable: false,
            reset_context: false,
            add_to_context: false,
            context_key,
        }
    }

    /// 按路由声明构建，谓词使用默认表达式引擎编译
    pub fn configure(route: &RouteConfig, pipeline: Box<dyn Pipeline>, engines: &ExpressionEngines) -> Result<Self> {
        let mut info = Self::new(&route.path_expression, pipeline);
        if let Some(predicate) = &route.filter_predicate {
            let engine = engines.get(None).map_err(RuleError::from)?;
            let compiled = engine
                .compile(predicate)
                .map_err(|e| predicate_error(&route.path_expression, e))?;
            info.filter_predicate = Some(compiled);
        }
        info.ignorable = route.ignorable;
        info.reset_context = route.reset_context;
        info.add_to_context = route.add_to_context;
        if let Some(key) = &route.context_key {
            info.context_key = key.clone();
        }
        Ok(info)
    }

    pub fn pipeline(&self) -> &dyn Pipeline {
        self.pipeline.as_ref()
    }

    pub fn path_expression(&self) -> &str {
        &self.path_expression
    }

    pub fn context_key(&self) -> &str {
        &self.context_key
    }

    /// 抽取子记录：数组逐个展开，null 跳过，非对象值包装为 `{"value": v}`
    pub fn extract(&self, document: &Value) -> Result<Vec<SourceMap>> {
        let matches = jsonpath_lib::select(document, &self.path_expression).map_err(|e| PipelineError::Path {
            path: self.path_expression.clone(),
            message: e.to_string(),
        })?;

        let mut items = Vec::new();
        for matched in matches {
            match matched {
                Value::Null => {}
                Value::Array(values) => {
                    items.extend(values.iter().filter(|v| !v.is_null()).cloned().map(into_source))
                }
                other => items.push(into_source(other.clone())),
            }
        }

        match &self.filter_predicate {
            Some(predicate) => {
                let mut kept = Vec::with_capacity(items.len());
                for item in items {
                    if self.admits(predicate.as_ref(), &item)? {
                        kept.push(item);
                    }
                }
                Ok(kept)
            }
            None => Ok(items),
        }
    }

    fn admits(&self, predicate: &dyn CompiledExpression, item: &SourceMap) -> Result<bool> {
        let mut bindings = Value::Object(item.clone());
        match predicate
            .evaluate(&mut bindings)
            .map_err(|e| predicate_error(&self.path_expression, e))?
        {
            Value::Bool(admitted) => Ok(admitted),
            response => Err(PipelineError::Rule(
                RuleEvaluationError::NonBooleanResponse {
                    rule: self.path_expression.clone(),
                    kind: RuleKind::Filter,
                    response,
                }
                .into(),
            )),
        }
    }

    /// 路由没有匹配项：可忽略时只记录日志
    fn unmatched(&self, composite: &str) -> Result<()> {
        if self.ignorable {
            info!(
                pipeline = composite,
                route = %self.path_expression,
                "路由没有匹配项，已忽略"
            );
            return Ok(());
        }
        Err(PipelineError::RouteNotMatched {
            pipeline: composite.to_string(),
            route: self.path_expression.clone(),
        })
    }

    /// 把已提交的实体回填到上下文：单个实体直接写入，多个写为数组
    fn fold(&self, context: &mut Context, mut entities: Vec<Value>) {
        if !self.add_to_context || entities.is_empty() {
            return;
        }
        let value = if entities.len() == 1 {
            entities.remove(0)
        } else {
            Value::Array(entities)
        };
        context.insert(self.context_key.clone(), value);
    }

    fn run(&mut self, item: SourceMap, context: &Context) -> Result<RecordResponse> {
        let mut child_context = context.clone();
        self.pipeline.process(item, &mut child_context)
    }
}

fn committed_entity(response: &RecordResponse) -> Option<Value> {
    if response.committed {
        response.entity.clone()
    } else {
        None
    }
}

fn dispatch_serial(
    composite: &str,
    routes: &mut [PipelineInfo],
    original: &Context,
    children: &mut Vec<RecordResponse>,
) -> Result<()> {
    let mut working = original.clone();

    for route in routes.iter_mut() {
        if route.reset_context {
            working = original.clone();
        }

        let items = route.extract(&working.as_value())?;
        debug!(pipeline = composite, route = %route.path_expression, items = items.len(), "路由匹配");
        if items.is_empty() {
            route.unmatched(composite)?;
            continue;
        }

        let mut entities = Vec::new();
        for item in items {
            let response = route.run(item, &working)?;
            entities.extend(committed_entity(&response));
            children.push(response);
        }
        route.fold(&mut working, entities);
    }

    Ok(())
}

fn dispatch_nested(
    composite: &str,
    routes: &mut [PipelineInfo],
    original: &Context,
    context: &Context,
    children: &mut Vec<RecordResponse>,
) -> Result<()> {
    let Some((route, rest)) = routes.split_first_mut() else {
        return Ok(());
    };
    let context = if route.reset_context { original } else { context };

    let items = route.extract(&context.as_value())?;
    debug!(pipeline = composite, route = %route.path_expression, items = items.len(), "路由匹配");
    if items.is_empty() {
        route.unmatched(composite)?;
        return dispatch_nested(composite, rest, original, context, children);
    }

    for item in items {
        // 下一层路由在匹配项（叠加在继承的上下文之上）中求值
        let mut next = context.clone();
        next.merge(&item);
        let response = route.run(item, context)?;
        route.fold(&mut next, committed_entity(&response).into_iter().collect());
        children.push(response);
        dispatch_nested(composite, rest, original, &next, children)?;
    }

    Ok(())
}

pub struct CompositePipeline {
    name: String,
    settings: PipelineSettings,
    nested: bool,
    routes: Vec<PipelineInfo>,
}

impl fmt::Debug for CompositePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositePipeline")
            .field("name", &self.name)
            .field("nested", &self.nested)
            .field("routes", &self.routes)
            .finish()
    }
}

impl CompositePipeline {
    pub fn new(name: impl Into<String>, settings: PipelineSettings, nested: bool) -> Self {
        Self {
            name: name.into(),
            settings,
            nested,
            routes: Vec::new(),
        }
    }

    pub fn with_route(mut self, route: PipelineInfo) -> Self {
        self.routes.push(route);
        self
    }

    pub fn routes(&self) -> &[PipelineInfo] {
        &self.routes
    }

    pub fn is_nested(&self) -> bool {
        self.nested
    }
}

impl Pipeline for CompositePipeline {
    fn name(&self) -> &str {
        &self.name
    }

    fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    fn process(&mut self, source: SourceMap, context: &mut Context) -> Result<RecordResponse> {
        let mut original = context.clone();
        original.merge(&source);

        let mut children = Vec::new();
        if self.nested {
            dispatch_nested(&self.name, &mut self.routes, &original, &original, &mut children)?;
        } else {
            dispatch_serial(&self.name, &mut self.routes, &original, &mut children)?;
        }

        Ok(RecordResponse::composite(source, children))
    }
}
