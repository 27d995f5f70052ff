//! 管道错误类型

use crate::response::ReadResponse;
use rule_engine::{RuleError, RuleValidationError};
use thiserror::Error;

/// 数据存储错误
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("实体不存在: {entity_type}/{id}")]
    NotFound { entity_type: String, id: String },

    #[error("实体已存在: {entity_type}/{id}")]
    Conflict { entity_type: String, id: String },

    #[error("没有活动的事务")]
    NoActiveTransaction,

    #[error("事务已处于活动状态")]
    TransactionAlreadyActive,

    #[error("存储后端错误: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// 数据级校验错误
    #[error(transparent)]
    Validation(Box<RuleValidationError>),

    /// 引擎级规则错误
    #[error("规则错误: {0}")]
    Rule(RuleError),

    #[error("映射 '{mapper}' 失败: {message}")]
    Mapping { mapper: String, message: String },

    #[error("存储错误: {0}")]
    Store(#[from] StoreError),

    #[error("管道 '{pipeline}' 的路由 '{route}' 没有匹配任何数据")]
    RouteNotMatched { pipeline: String, route: String },

    #[error("路径表达式 '{path}' 无效: {message}")]
    Path { path: String, message: String },

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("未注册的{kind}: {name}")]
    UnknownComponent { kind: &'static str, name: String },

    #[error("第 {line} 行记录无效: {message}")]
    InvalidRecord { line: usize, message: String },

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON 序列化错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 终止模式下的批处理中止，携带已处理部分的结果
    #[error("读取在第 {} 条记录处中止: {cause}", .response.record_count)]
    Aborted {
        response: Box<ReadResponse>,
        cause: Box<RuleValidationError>,
    },

    /// 致命错误中断读取循环，携带出错前已处理部分的结果
    #[error("读取在第 {} 条记录处失败: {cause}", .response.record_count)]
    Failed {
        response: Box<ReadResponse>,
        cause: Box<PipelineError>,
    },
}

impl From<RuleError> for PipelineError {
    fn from(err: RuleError) -> Self {
        match err {
            RuleError::Validation(validation) => Self::Validation(validation),
            other => Self::Rule(other),
        }
    }
}

impl From<RuleValidationError> for PipelineError {
    fn from(err: RuleValidationError) -> Self {
        Self::Validation(Box::new(err))
    }
}

impl PipelineError {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn as_validation(&self) -> Option<&RuleValidationError> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Aborted { cause, .. } => Some(cause),
            _ => None,
        }
    }

    /// 读取循环中断时已处理部分的结果
    pub fn partial_response(&self) -> Option<&ReadResponse> {
        match self {
            Self::Aborted { response, .. } | Self::Failed { response, .. } => Some(response.as_ref()),
            _ => None,
        }
    }

    /// 去掉读取循环的包装，返回引起中断的错误
    pub fn root_cause(&self) -> &PipelineError {
        match self {
            Self::Failed { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rule_engine::RuleEvaluationError;

    fn validation_error() -> RuleValidationError {
        RuleValidationError {
            namespace: "default".to_string(),
            rule_name: "positive_amount".to_string(),
            entity_type: "order".to_string(),
            field: None,
            error_code: 1,
            validation_error_code: 100,
            message: "invalid".to_string(),
        }
    }

    #[test]
    fn test_rule_validation_maps_to_validation() {
        let err: PipelineError = RuleError::from(validation_error()).into();
        assert!(err.is_validation());

        let err: PipelineError =
            RuleError::from(RuleEvaluationError::MissingReference("a:b".to_string())).into();
        assert!(matches!(err, PipelineError::Rule(_)));
        assert!(err.as_validation().is_none());
    }

    #[test]
    fn test_aborted_display() {
        let err = PipelineError::Aborted {
            response: Box::new(ReadResponse {
                record_count: 3,
                ..Default::default()
            }),
            cause: Box::new(validation_error()),
        };
        assert!(err.to_string().contains("第 3 条"));
        assert_eq!(err.as_validation().unwrap().validation_error_code, 100);
        assert_eq!(err.partial_response().unwrap().record_count, 3);
    }

    #[test]
    fn test_failed_keeps_partial_response() {
        let err = PipelineError::Failed {
            response: Box::new(ReadResponse {
                record_count: 2,
                commit_count: 1,
                ..Default::default()
            }),
            cause: Box::new(StoreError::Backend("连接中断".to_string()).into()),
        };
        assert!(err.to_string().contains("第 2 条"));
        assert_eq!(err.partial_response().unwrap().commit_count, 1);
        assert!(matches!(
            err.root_cause(),
            PipelineError::Store(StoreError::Backend(_))
        ));
        assert!(err.as_validation().is_none());
    }
}
