//! 规则执行入口
//!
//! - [`RulesExecutor`]：对一条输入执行完整规则集，返回单个评估状态
//! - [`FilterChain`]：只接受过滤规则的准入门，在映射之前执行

use crate::error::{Result, RuleEvaluationError};
use crate::evaluator::RulesEvaluator;
use crate::models::{EvaluationStatus, RuleConfig, StatusCode};
use crate::reader::RuleConfigReader;
use crate::rule::Rule;
use crate::target::RuleTarget;
use std::sync::Arc;

/// 规则执行器
pub struct RulesExecutor<T> {
    evaluator: RulesEvaluator<T>,
}

impl<T> Clone for RulesExecutor<T> {
    fn clone(&self) -> Self {
        Self {
            evaluator: self.evaluator.clone(),
        }
    }
}

impl<T> RulesExecutor<T> {
    pub fn new(rules: Vec<Arc<Rule<T>>>) -> Self {
        Self {
            evaluator: RulesEvaluator::new(rules),
        }
    }

    /// 构建规则列表，引用规则通过读取器绑定的缓存解析
    pub fn configure(configs: &[RuleConfig], reader: &RuleConfigReader<T>) -> Result<Self> {
        Ok(Self::new(reader.read(configs)?))
    }

    pub fn rules(&self) -> &[Arc<Rule<T>>] {
        self.evaluator.rules()
    }
}

impl<T: RuleTarget> RulesExecutor<T> {
    pub fn evaluate(&self, target: &mut T) -> Result<EvaluationStatus> {
        let mut status = EvaluationStatus::success();
        self.evaluator.evaluate(target, &mut status)?;
        status.finalize();
        Ok(status)
    }
}

/// 过滤链
pub struct FilterChain<T> {
    evaluator: RulesEvaluator<T>,
}

impl<T> Clone for FilterChain<T> {
    fn clone(&self) -> Self {
        Self {
            evaluator: self.evaluator.clone(),
        }
    }
}

impl<T> FilterChain<T> {
    /// 拒绝任何非过滤规则（规则组需递归只包含过滤规则）
    pub fn new(rules: Vec<Arc<Rule<T>>>) -> Result<Self> {
        if let Some(rule) = rules.iter().find(|r| !r.is_filter_only()) {
            return Err(RuleEvaluationError::NotAFilter {
                rule: rule.key(),
                kind: rule.kind(),
            }
            .into());
        }
        Ok(Self {
            evaluator: RulesEvaluator::new(rules),
        })
    }

    pub fn configure(configs: &[RuleConfig], reader: &RuleConfigReader<T>) -> Result<Self> {
        Self::new(reader.read(configs)?)
    }

    pub fn rules(&self) -> &[Arc<Rule<T>>] {
        self.evaluator.rules()
    }
}

impl<T: RuleTarget> FilterChain<T> {
    /// 只返回 `Success` 或 `IgnoreRecord`
    pub fn evaluate(&self, target: &mut T) -> Result<StatusCode> {
        let mut status = EvaluationStatus::success();
        self.evaluator.evaluate(target, &mut status)?;
        Ok(match status.status {
            StatusCode::IgnoreRecord => StatusCode::IgnoreRecord,
            _ => StatusCode::Success,
        })
    }

    /// 记录是否通过准入
    pub fn admits(&self, target: &mut T) -> Result<bool> {
        Ok(self.evaluate(target)? == StatusCode::Success)
    }
}
