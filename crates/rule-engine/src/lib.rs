//! 规则引擎
//!
//! 提供可组合的类型化规则树：
//! - 转换、校验、过滤、条件、规则组、引用六类规则
//! - 短路求值与校验错误汇总/快速失败策略
//! - 声明式配置读取与按名称缓存复用
//! - 可插拔的表达式引擎（默认 rhai）

pub mod cache;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod expression;
pub mod models;
pub mod reader;
pub mod rule;
pub mod target;

pub use cache::{RulesCache, RulesCacheStats};
pub use error::{ExpressionError, Result, RuleError, RuleEvaluationError, RuleValidationError};
pub use evaluator::RulesEvaluator;
pub use executor::{FilterChain, RulesExecutor};
pub use expression::{
    CompiledExpression, DEFAULT_ENGINE, ExpressionEngine, ExpressionEngines, RECORD_BINDING,
    RhaiEngine,
};
pub use models::{EvaluationStatus, RuleConfig, RuleDef, RuleKind, StatusCode};
pub use reader::RuleConfigReader;
pub use rule::{Rule, RuleEnv, RuleMeta, RuleVisitor};
pub use target::RuleTarget;
