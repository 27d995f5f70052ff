//! 规则节点
//!
//! 每个 [`Rule`] 在配置阶段完成校验和表达式编译，之后不可变，可被多条记录并发复用。

use crate::error::{Result, RuleError, RuleEvaluationError, RuleValidationError};
use crate::evaluator::RulesEvaluator;
use crate::expression::{CompiledExpression, ExpressionEngines};
use crate::models::{EvaluationStatus, RuleConfig, RuleKind, StatusCode, rule_key};
use crate::target::RuleTarget;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

pub type SuccessCallback = Box<dyn Fn(&RuleMeta, &EvaluationStatus) + Send + Sync>;
pub type ErrorCallback = Box<dyn Fn(&RuleMeta, &RuleError) + Send + Sync>;

/// 规则访问器，每次评估后同步回调一次
#[derive(Default)]
pub struct RuleVisitor {
    on_success: Option<SuccessCallback>,
    on_error: Option<ErrorCallback>,
}

impl RuleVisitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(&RuleMeta, &EvaluationStatus) + Send + Sync + 'static,
    {
        self.on_success = Some(Box::new(f));
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&RuleMeta, &RuleError) + Send + Sync + 'static,
    {
        self.on_error = Some(Box::new(f));
        self
    }

    fn visit(&self, meta: &RuleMeta, result: &Result<EvaluationStatus>) {
        match result {
            Ok(status) => {
                if let Some(f) = &self.on_success {
                    f(meta, status);
                }
            }
            Err(err) => {
                if let Some(f) = &self.on_error {
                    f(meta, err);
                }
            }
        }
    }
}

impl fmt::Debug for RuleVisitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleVisitor")
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// 规则构建环境
#[derive(Debug, Clone)]
pub struct RuleEnv {
    /// 规则绑定的实体类型，写入校验错误
    pub entity_type: String,
    pub engines: ExpressionEngines,
    /// 规则未显式配置时使用的默认值
    pub terminate_on_validation_error: bool,
    pub visitor: Option<Arc<RuleVisitor>>,
}

impl RuleEnv {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            engines: ExpressionEngines::new(),
            terminate_on_validation_error: true,
            visitor: None,
        }
    }

    pub fn with_engines(mut self, engines: ExpressionEngines) -> Self {
        self.engines = engines;
        self
    }

    pub fn with_terminate_on_validation_error(mut self, terminate: bool) -> Self {
        self.terminate_on_validation_error = terminate;
        self
    }

    pub fn with_visitor(mut self, visitor: Arc<RuleVisitor>) -> Self {
        self.visitor = Some(visitor);
        self
    }
}

impl Default for RuleEnv {
    fn default() -> Self {
        Self::new("default")
    }
}

/// 规则的静态描述信息
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMeta {
    pub namespace: String,
    pub name: String,
    pub kind: RuleKind,
    pub entity_type: String,
    pub error_code: i64,
    pub validation_error_code: Option<i64>,
    pub field: Option<String>,
    pub terminate_on_validation_error: bool,
}

impl RuleMeta {
    pub fn key(&self) -> String {
        rule_key(&self.namespace, &self.name)
    }
}

/// 规则节点
pub struct Rule<T> {
    meta: RuleMeta,
    expression: Option<Arc<dyn CompiledExpression>>,
    children: Option<RulesEvaluator<T>>,
    visitor: Option<Arc<RuleVisitor>>,
}

impl<T> fmt::Debug for Rule<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("meta", &self.meta)
            .field("expression", &self.expression.as_ref().map(|e| e.source()))
            .field("children", &self.children.as_ref().map(|c| c.len()).unwrap_or(0))
            .finish()
    }
}

fn invalid(config: &RuleConfig, reason: impl Into<String>) -> RuleError {
    RuleEvaluationError::InvalidConfig {
        rule: config.key(),
        reason: reason.into(),
    }
    .into()
}

impl<T> Rule<T> {
    /// 根据声明构建规则，`children` 为已构建好的子规则
    pub fn configure(config: &RuleConfig, children: Vec<Arc<Rule<T>>>, env: &RuleEnv) -> Result<Self> {
        if config.name.trim().is_empty() {
            return Err(invalid(config, "规则名称不能为空"));
        }

        let kind = config.rule_type;
        if kind == RuleKind::Reference {
            return Err(invalid(config, "引用规则只能通过缓存解析"));
        }

        if !children.is_empty() && !kind.allows_children() {
            return Err(RuleEvaluationError::NestedRulesNotAllowed {
                rule: config.key(),
                kind,
            }
            .into());
        }
        if kind == RuleKind::Group && children.is_empty() {
            return Err(invalid(config, "规则组至少需要一条子规则"));
        }

        let error_code = match config.error_code {
            Some(code) => code,
            None if kind.requires_error_code() => {
                return Err(invalid(config, "缺少 errorCode"));
            }
            None => 0,
        };

        if kind == RuleKind::Validation && config.validation_error_code.is_none() {
            return Err(invalid(config, "校验规则必须配置 validationErrorCode"));
        }

        let expression = if kind.requires_expression() {
            let source = config
                .expression
                .as_deref()
                .filter(|e| !e.trim().is_empty())
                .ok_or_else(|| invalid(config, "缺少 expression"))?;
            let engine = env.engines.get(config.engine.as_deref())?;
            let compiled = engine
                .compile(source)
                .map_err(|source| RuleEvaluationError::Expression {
                    rule: config.key(),
                    source,
                })?;
            Some(compiled)
        } else {
            None
        };

        let meta = RuleMeta {
            namespace: config.namespace.clone(),
            name: config.name.clone(),
            kind,
            entity_type: env.entity_type.clone(),
            error_code,
            validation_error_code: config.validation_error_code,
            field: config.field.clone(),
            terminate_on_validation_error: config
                .terminate_on_validation_error
                .unwrap_or(env.terminate_on_validation_error),
        };

        let children = if children.is_empty() {
            None
        } else {
            Some(RulesEvaluator::new(children))
        };

        Ok(Self {
            meta,
            expression,
            children,
            visitor: env.visitor.clone(),
        })
    }

    pub fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn namespace(&self) -> &str {
        &self.meta.namespace
    }

    pub fn kind(&self) -> RuleKind {
        self.meta.kind
    }

    pub fn key(&self) -> String {
        self.meta.key()
    }

    pub fn children(&self) -> Option<&RulesEvaluator<T>> {
        self.children.as_ref()
    }

    /// 当前规则是否是过滤规则，或仅由过滤规则组成的规则组
    pub fn is_filter_only(&self) -> bool {
        match self.meta.kind {
            RuleKind::Filter => self.children.is_none(),
            RuleKind::Group => self
                .children
                .as_ref()
                .is_some_and(|c| c.rules().iter().all(|r| r.is_filter_only())),
            _ => false,
        }
    }
}

impl<T: RuleTarget> Rule<T> {
    /// 对输入评估规则（含子规则），访问器在返回前被调用一次
    pub fn evaluate(&self, target: &mut T) -> Result<EvaluationStatus> {
        let result = self.evaluate_inner(target);
        if let Some(visitor) = &self.visitor {
            visitor.visit(&self.meta, &result);
        }
        result
    }

    fn evaluate_inner(&self, target: &mut T) -> Result<EvaluationStatus> {
        let mut status = EvaluationStatus::success();
        let response = self.do_evaluate(target)?;
        if let Some(response) = &response {
            status.response = Some(response.clone());
        }

        match self.meta.kind {
            RuleKind::Filter => match response {
                Some(Value::Bool(true)) => {
                    status.status = StatusCode::IgnoreRecord;
                    return Ok(status);
                }
                Some(Value::Bool(false)) => {}
                other => self.non_boolean(other)?,
            },
            RuleKind::Condition => match response {
                Some(Value::Bool(false)) => {
                    status.status = StatusCode::Failed;
                    return Ok(status);
                }
                Some(Value::Bool(true)) => {}
                other => self.non_boolean(other)?,
            },
            RuleKind::Validation => {
                if response != Some(Value::Bool(true)) {
                    let error = self.validation_error(response.as_ref());
                    if self.meta.terminate_on_validation_error {
                        return Err(error.into());
                    }
                    status.add_error(error);
                }
            }
            _ => {}
        }

        if let Some(children) = &self.children {
            children.evaluate(target, &mut status)?;
        }

        status.finalize();
        Ok(status)
    }

    /// 执行表达式；转换规则会把修改后的绑定写回输入
    fn do_evaluate(&self, target: &mut T) -> Result<Option<Value>> {
        let Some(expression) = &self.expression else {
            return Ok(None);
        };

        let mut bindings = target.bindings().map_err(|source| RuleEvaluationError::Target {
            rule: self.key(),
            source,
        })?;

        let response = expression
            .evaluate(&mut bindings)
            .map_err(|source| RuleEvaluationError::Expression {
                rule: self.key(),
                source,
            })?;

        if self.meta.kind == RuleKind::Transformation {
            target
                .apply_bindings(bindings)
                .map_err(|source| RuleEvaluationError::Target {
                    rule: self.key(),
                    source,
                })?;
        }

        Ok(Some(response))
    }

    fn non_boolean(&self, response: Option<Value>) -> Result<()> {
        let response = response.unwrap_or(Value::Null);
        if self.meta.terminate_on_validation_error {
            return Err(RuleEvaluationError::NonBooleanResponse {
                rule: self.key(),
                kind: self.meta.kind,
                response,
            }
            .into());
        }

        warn!(
            rule = %self.key(),
            kind = %self.meta.kind,
            response = %response,
            "规则返回了非布尔结果，按未命中处理"
        );
        Ok(())
    }

    fn validation_error(&self, response: Option<&Value>) -> RuleValidationError {
        let message = match response {
            Some(Value::String(message)) => message.clone(),
            _ => format!("规则 {} 校验未通过", self.key()),
        };

        RuleValidationError {
            namespace: self.meta.namespace.clone(),
            rule_name: self.meta.name.clone(),
            entity_type: self.meta.entity_type.clone(),
            field: self.meta.field.clone(),
            error_code: self.meta.error_code,
            validation_error_code: self.meta.validation_error_code.unwrap_or(self.meta.error_code),
            message,
        }
    }
}
