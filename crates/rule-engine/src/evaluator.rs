//! 规则列表评估器
//!
//! 按声明顺序执行规则，统一定义短路与错误汇总语义：
//! - 过滤规则命中 → `IgnoreRecord`，停止后续兄弟规则
//! - 条件规则不满足 → `Failed`，停止后续兄弟规则
//! - 校验错误：终止模式下直接上抛，否则汇总到共享状态

use crate::error::Result;
use crate::models::{EvaluationStatus, StatusCode};
use crate::rule::Rule;
use crate::target::RuleTarget;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

pub struct RulesEvaluator<T> {
    rules: Vec<Arc<Rule<T>>>,
    _target: PhantomData<fn(&mut T)>,
}

impl<T> Clone for RulesEvaluator<T> {
    fn clone(&self) -> Self {
        Self {
            rules: self.rules.clone(),
            _target: PhantomData,
        }
    }
}

impl<T> RulesEvaluator<T> {
    pub fn new(rules: Vec<Arc<Rule<T>>>) -> Self {
        Self {
            rules,
            _target: PhantomData,
        }
    }

    pub fn rules(&self) -> &[Arc<Rule<T>>] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl<T: RuleTarget> RulesEvaluator<T> {
    pub fn evaluate(&self, target: &mut T, status: &mut EvaluationStatus) -> Result<()> {
        for (index, rule) in self.rules.iter().enumerate() {
            // 终止模式下的校验错误由规则自身上抛
            let EvaluationStatus {
                status: code,
                errors,
                response,
            } = rule.evaluate(target)?;

            if response.is_some() {
                status.response = response;
            }
            status.errors.extend(errors);

            if matches!(code, StatusCode::IgnoreRecord | StatusCode::Failed) {
                debug!(
                    rule = %rule.key(),
                    kind = %rule.kind(),
                    status = %code,
                    skipped = self.rules.len() - index - 1,
                    "规则短路"
                );
                status.status = code;
                return Ok(());
            }
        }

        Ok(())
    }
}
