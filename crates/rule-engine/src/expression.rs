//! 表达式引擎
//!
//! 规则表达式通过 [`ExpressionEngine`] 编译一次，之后对每条记录重复执行。
//! 默认引擎基于 rhai 脚本：记录的顶层字段作为变量注入，完整记录以 `record` 变量注入。

use crate::error::{ExpressionError, RuleEvaluationError};
use rhai::{AST, Dynamic, Engine, Scope};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 完整记录在表达式中的变量名
pub const RECORD_BINDING: &str = "record";

/// 默认表达式引擎名称
pub const DEFAULT_ENGINE: &str = "rhai";

/// 表达式引擎
pub trait ExpressionEngine: Send + Sync {
    fn name(&self) -> &str;

    fn compile(&self, expression: &str) -> Result<Arc<dyn CompiledExpression>, ExpressionError>;
}

/// 编译后的表达式
pub trait CompiledExpression: Send + Sync + fmt::Debug {
    /// 原始表达式文本
    fn source(&self) -> &str;

    /// 对绑定求值，表达式对绑定的修改直接写回 `bindings`
    fn evaluate(&self, bindings: &mut Value) -> Result<Value, ExpressionError>;
}

/// 表达式引擎注册表
#[derive(Clone)]
pub struct ExpressionEngines {
    engines: HashMap<String, Arc<dyn ExpressionEngine>>,
    default_engine: String,
}

impl ExpressionEngines {
    /// 创建注册表，预注册 rhai 引擎
    pub fn new() -> Self {
        let mut engines: HashMap<String, Arc<dyn ExpressionEngine>> = HashMap::new();
        engines.insert(DEFAULT_ENGINE.to_string(), Arc::new(RhaiEngine::new()));
        Self {
            engines,
            default_engine: DEFAULT_ENGINE.to_string(),
        }
    }

    pub fn register(&mut self, engine: Arc<dyn ExpressionEngine>) {
        self.engines.insert(engine.name().to_string(), engine);
    }

    pub fn set_default(&mut self, name: impl Into<String>) -> Result<(), RuleEvaluationError> {
        let name = name.into();
        if !self.engines.contains_key(&name) {
            return Err(RuleEvaluationError::UnknownEngine(name));
        }
        self.default_engine = name;
        Ok(())
    }

    pub fn default_name(&self) -> &str {
        &self.default_engine
    }

    /// 按名称获取引擎，`None` 返回默认引擎
    pub fn get(&self, name: Option<&str>) -> Result<Arc<dyn ExpressionEngine>, RuleEvaluationError> {
        let name = name.unwrap_or(&self.default_engine);
        self.engines
            .get(name)
            .cloned()
            .ok_or_else(|| RuleEvaluationError::UnknownEngine(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.engines.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ExpressionEngines {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExpressionEngines {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpressionEngines")
            .field("engines", &self.names())
            .field("default_engine", &self.default_engine)
            .finish()
    }
}

/// rhai 脚本引擎
#[derive(Clone)]
pub struct RhaiEngine {
    engine: Arc<Engine>,
}

impl RhaiEngine {
    pub fn new() -> Self {
        Self::with_engine(Engine::new())
    }

    /// 使用预先配置（注册了自定义函数）的 rhai 引擎
    pub fn with_engine(engine: Engine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }
}

impl Default for RhaiEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpressionEngine for RhaiEngine {
    fn name(&self) -> &str {
        DEFAULT_ENGINE
    }

    fn compile(&self, expression: &str) -> Result<Arc<dyn CompiledExpression>, ExpressionError> {
        let ast = self
            .engine
            .compile(expression)
            .map_err(|e| ExpressionError::Compile {
                expression: expression.to_string(),
                message: e.to_string(),
            })?;

        Ok(Arc::new(RhaiExpression {
            engine: self.engine.clone(),
            source: expression.to_string(),
            ast,
        }))
    }
}

struct RhaiExpression {
    engine: Arc<Engine>,
    source: String,
    ast: AST,
}

impl fmt::Debug for RhaiExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RhaiExpression")
            .field("source", &self.source)
            .finish()
    }
}

impl RhaiExpression {
    fn runtime_error(&self, message: impl ToString) -> ExpressionError {
        ExpressionError::Runtime {
            expression: self.source.clone(),
            message: message.to_string(),
        }
    }
}

fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    key != RECORD_BINDING && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn to_dynamic(value: &Value) -> Result<Dynamic, ExpressionError> {
    rhai::serde::to_dynamic(value).map_err(|e| ExpressionError::Conversion(e.to_string()))
}

fn from_dynamic(value: &Dynamic) -> Result<Value, ExpressionError> {
    rhai::serde::from_dynamic::<Value>(value).map_err(|e| ExpressionError::Conversion(e.to_string()))
}

impl CompiledExpression for RhaiExpression {
    fn source(&self) -> &str {
        &self.source
    }

    fn evaluate(&self, bindings: &mut Value) -> Result<Value, ExpressionError> {
        let mut scope = Scope::new();

        // 顶层字段作为变量，便于书写 `amount > 0`
        let fields: Vec<(String, Value)> = match bindings {
            Value::Object(map) => map
                .iter()
                .filter(|(k, _)| is_identifier(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            _ => Vec::new(),
        };
        for (key, value) in &fields {
            scope.push_dynamic(key.clone(), to_dynamic(value)?);
        }
        scope.push_dynamic(RECORD_BINDING, to_dynamic(bindings)?);

        let result = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, &self.ast)
            .map_err(|e| self.runtime_error(e))?;

        // 写回：先取 record，再用被修改过的顶层变量覆盖
        let mut updated = match scope.get_value::<Dynamic>(RECORD_BINDING) {
            Some(record) => from_dynamic(&record)?,
            None => bindings.clone(),
        };
        if let Value::Object(map) = &mut updated {
            for (key, original) in fields {
                if let Some(current) = scope.get_value::<Dynamic>(&key) {
                    let current = from_dynamic(&current)?;
                    if current != original {
                        map.insert(key, current);
                    }
                }
            }
        }
        *bindings = updated;

        from_dynamic(&result)
    }
}
