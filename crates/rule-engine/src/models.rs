//! 规则引擎领域模型

use crate::error::{Result, RuleValidationError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// 默认命名空间
pub const DEFAULT_NAMESPACE: &str = "default";

/// 通用属性包，规则声明的无类型表示
pub type RuleDef = Map<String, Value>;

/// 评估状态码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    Success,
    Failed,
    IgnoreRecord,
    ValidationFailed,
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::IgnoreRecord => "ignore_record",
            Self::ValidationFailed => "validation_failed",
        };
        write!(f, "{}", s)
    }
}

/// 一次规则（或规则树）评估的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationStatus {
    pub status: StatusCode,
    /// 收集到的校验错误（按发生顺序）
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<RuleValidationError>,
    /// 最近一次执行的规则的原始响应
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
}

impl EvaluationStatus {
    pub fn success() -> Self {
        Self::with_status(StatusCode::Success)
    }

    pub fn with_status(status: StatusCode) -> Self {
        Self {
            status,
            errors: Vec::new(),
            response: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StatusCode::Success
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// 是否为短路状态（过滤或条件不满足）
    pub fn is_short_circuit(&self) -> bool {
        matches!(self.status, StatusCode::IgnoreRecord | StatusCode::Failed)
    }

    pub fn add_error(&mut self, error: RuleValidationError) {
        self.errors.push(error);
    }

    /// 未发生短路但存在收集的错误时，状态降级为 ValidationFailed
    pub fn finalize(&mut self) {
        if self.status == StatusCode::Success && !self.errors.is_empty() {
            self.status = StatusCode::ValidationFailed;
        }
    }

    /// 合并另一个状态：错误累加，状态取更严重者
    pub fn merge(&mut self, other: EvaluationStatus) {
        self.errors.extend(other.errors);
        if other.response.is_some() {
            self.response = other.response;
        }
        if other.status.severity() > self.status.severity() {
            self.status = other.status;
        }
        self.finalize();
    }
}

impl StatusCode {
    fn severity(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::IgnoreRecord => 1,
            Self::ValidationFailed => 2,
            Self::Failed => 3,
        }
    }
}

impl Default for EvaluationStatus {
    fn default() -> Self {
        Self::success()
    }
}

/// 规则类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    #[serde(alias = "Transformation")]
    Transformation,
    #[serde(alias = "Validation")]
    Validation,
    #[serde(alias = "Filter")]
    Filter,
    #[serde(alias = "Condition")]
    Condition,
    #[serde(alias = "Group")]
    Group,
    #[serde(alias = "Reference")]
    Reference,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transformation => "transformation",
            Self::Validation => "validation",
            Self::Filter => "filter",
            Self::Condition => "condition",
            Self::Group => "group",
            Self::Reference => "reference",
        }
    }

    pub fn requires_expression(&self) -> bool {
        !matches!(self, Self::Group | Self::Reference)
    }

    pub fn requires_error_code(&self) -> bool {
        !matches!(self, Self::Group | Self::Reference)
    }

    /// 只有 group 和 condition 可以挂载子规则
    pub fn allows_children(&self) -> bool {
        matches!(self, Self::Group | Self::Condition)
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RuleKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "transformation" => Ok(Self::Transformation),
            "validation" => Ok(Self::Validation),
            "filter" => Ok(Self::Filter),
            "condition" => Ok(Self::Condition),
            "group" => Ok(Self::Group),
            "reference" => Ok(Self::Reference),
            other => Err(format!("未知的规则类型: {}", other)),
        }
    }
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

/// 规则声明
///
/// 未识别的键保存在 `properties` 中，与 [`RuleDef`] 之间可无损往返。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleConfig {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub name: String,
    pub rule_type: RuleKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_error_code: Option<i64>,
    /// 覆盖管道级别的 terminateOnValidationError
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminate_on_validation_error: Option<bool>,
    /// 表达式引擎名称，缺省使用默认引擎
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    /// 校验失败时报告的字段
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<RuleConfig>,
    #[serde(flatten)]
    pub properties: RuleDef,
}

impl RuleConfig {
    pub fn new(name: impl Into<String>, rule_type: RuleKind) -> Self {
        Self {
            namespace: default_namespace(),
            name: name.into(),
            rule_type,
            expression: None,
            error_code: None,
            validation_error_code: None,
            terminate_on_validation_error: None,
            engine: None,
            field: None,
            rules: Vec::new(),
            properties: RuleDef::new(),
        }
    }

    pub fn transformation(name: impl Into<String>, expression: impl Into<String>, error_code: i64) -> Self {
        Self::new(name, RuleKind::Transformation)
            .with_expression(expression)
            .with_error_code(error_code)
    }

    pub fn validation(
        name: impl Into<String>,
        expression: impl Into<String>,
        error_code: i64,
        validation_error_code: i64,
    ) -> Self {
        Self::new(name, RuleKind::Validation)
            .with_expression(expression)
            .with_error_code(error_code)
            .with_validation_error_code(validation_error_code)
    }

    pub fn filter(name: impl Into<String>, expression: impl Into<String>, error_code: i64) -> Self {
        Self::new(name, RuleKind::Filter)
            .with_expression(expression)
            .with_error_code(error_code)
    }

    pub fn condition(name: impl Into<String>, expression: impl Into<String>, error_code: i64) -> Self {
        Self::new(name, RuleKind::Condition)
            .with_expression(expression)
            .with_error_code(error_code)
    }

    pub fn group(name: impl Into<String>, rules: Vec<RuleConfig>) -> Self {
        Self::new(name, RuleKind::Group).with_rules(rules)
    }

    pub fn reference(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(name, RuleKind::Reference).with_namespace(namespace)
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }

    pub fn with_error_code(mut self, code: i64) -> Self {
        self.error_code = Some(code);
        self
    }

    pub fn with_validation_error_code(mut self, code: i64) -> Self {
        self.validation_error_code = Some(code);
        self
    }

    pub fn with_terminate_on_validation_error(mut self, terminate: bool) -> Self {
        self.terminate_on_validation_error = Some(terminate);
        self
    }

    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = Some(engine.into());
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_rules(mut self, rules: Vec<RuleConfig>) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// 缓存键：`namespace:name`
    pub fn key(&self) -> String {
        rule_key(&self.namespace, &self.name)
    }

    /// 转换为通用属性包
    pub fn to_def(&self) -> Result<RuleDef> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            // 结构体总是序列化为对象
            other => Ok(RuleDef::from_iter([("value".to_string(), other)])),
        }
    }

    /// 从通用属性包构建
    pub fn from_def(def: &RuleDef) -> Result<Self> {
        Ok(serde_json::from_value(Value::Object(def.clone()))?)
    }
}

/// 规则在缓存中的键
pub fn rule_key(namespace: &str, name: &str) -> String {
    format!("{}:{}", namespace, name)
}
