//! 规则引擎错误类型
//!
//! 区分两类错误：
//! - [`RuleValidationError`]：数据级校验失败，可按批处理策略收集或中止
//! - [`RuleEvaluationError`]：引擎级错误（配置错误、非布尔响应、引用缺失等），始终致命

use crate::models::RuleKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// 数据级校验错误
///
/// `validation_error_code` 标识具体的校验失败，`error_code` 为规则的通用错误码，用于归类。
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[error(
    "规则校验失败: {namespace}:{rule_name} (entity={entity_type}, code={validation_error_code}): {message}"
)]
pub struct RuleValidationError {
    pub namespace: String,
    pub rule_name: String,
    pub entity_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub error_code: i64,
    pub validation_error_code: i64,
    pub message: String,
}

/// 表达式引擎错误
#[derive(Debug, Error)]
pub enum ExpressionError {
    #[error("表达式编译失败 '{expression}': {message}")]
    Compile { expression: String, message: String },

    #[error("表达式执行失败 '{expression}': {message}")]
    Runtime { expression: String, message: String },

    #[error("表达式结果转换失败: {0}")]
    Conversion(String),
}

/// 引擎级错误，永远不会被降级为可收集的校验错误
#[derive(Debug, Error)]
pub enum RuleEvaluationError {
    #[error("规则配置无效 '{rule}': {reason}")]
    InvalidConfig { rule: String, reason: String },

    #[error("规则 '{rule}' ({kind}) 返回了非布尔结果: {response}")]
    NonBooleanResponse {
        rule: String,
        kind: RuleKind,
        response: Value,
    },

    #[error("引用的规则不存在: {0}")]
    MissingReference(String),

    #[error("规则 '{rule}' 类型为 {kind}，不允许包含子规则")]
    NestedRulesNotAllowed { rule: String, kind: RuleKind },

    #[error("过滤链只接受 filter 规则: '{rule}' 类型为 {kind}")]
    NotAFilter { rule: String, kind: RuleKind },

    #[error("未注册的表达式引擎: {0}")]
    UnknownEngine(String),

    #[error("规则 '{rule}' 表达式错误: {source}")]
    Expression {
        rule: String,
        #[source]
        source: ExpressionError,
    },

    #[error("规则 '{rule}' 无法读写输入数据: {source}")]
    Target {
        rule: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum RuleError {
    #[error(transparent)]
    Validation(Box<RuleValidationError>),

    #[error(transparent)]
    Evaluation(#[from] RuleEvaluationError),

    #[error("JSON 序列化错误: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl From<RuleValidationError> for RuleError {
    fn from(err: RuleValidationError) -> Self {
        Self::Validation(Box::new(err))
    }
}

impl RuleError {
    /// 是否为数据级校验错误
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn as_validation(&self) -> Option<&RuleValidationError> {
        match self {
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, RuleError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_validation_error() -> RuleValidationError {
        RuleValidationError {
            namespace: "orders".to_string(),
            rule_name: "positive_amount".to_string(),
            entity_type: "order".to_string(),
            field: Some("amount".to_string()),
            error_code: 1,
            validation_error_code: 100,
            message: "amount 必须大于 0".to_string(),
        }
    }

    #[test]
    fn test_validation_error_display() {
        let msg = sample_validation_error().to_string();
        assert!(msg.contains("orders:positive_amount"));
        assert!(msg.contains("code=100"));
    }

    #[test]
    fn test_rule_error_classification() {
        let err: RuleError = sample_validation_error().into();
        assert!(err.is_validation());
        assert_eq!(err.as_validation().unwrap().validation_error_code, 100);

        let err: RuleError = RuleEvaluationError::MissingReference("default:shared".to_string()).into();
        assert!(!err.is_validation());
        assert!(err.as_validation().is_none());
    }

    #[test]
    fn test_validation_error_serialization() {
        let json = serde_json::to_value(sample_validation_error()).unwrap();
        assert_eq!(json["ruleName"], "positive_amount");
        assert_eq!(json["validationErrorCode"], 100);
    }
}
