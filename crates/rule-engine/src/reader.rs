//! 规则配置读取器
//!
//! 将声明式规则配置构建为规则树：引用规则从缓存解析，嵌套规则先于父规则构建。

use crate::cache::RulesCache;
use crate::error::{Result, RuleEvaluationError};
use crate::models::{RuleConfig, RuleKind};
use crate::rule::{Rule, RuleEnv};
use std::sync::Arc;
use tracing::debug;

pub struct RuleConfigReader<T> {
    env: RuleEnv,
    cache: Option<RulesCache<T>>,
}

impl<T> Clone for RuleConfigReader<T> {
    fn clone(&self) -> Self {
        Self {
            env: self.env.clone(),
            cache: self.cache.clone(),
        }
    }
}

impl<T> RuleConfigReader<T> {
    pub fn new(env: RuleEnv) -> Self {
        Self { env, cache: None }
    }

    /// 绑定用于解析引用规则的缓存
    pub fn with_cache(mut self, cache: RulesCache<T>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn env(&self) -> &RuleEnv {
        &self.env
    }

    pub fn cache(&self) -> Option<&RulesCache<T>> {
        self.cache.as_ref()
    }

    /// 按声明顺序构建规则列表
    pub fn read(&self, configs: &[RuleConfig]) -> Result<Vec<Arc<Rule<T>>>> {
        configs.iter().map(|config| self.read_one(config)).collect()
    }

    /// 从 JSON 数组读取规则
    pub fn read_json(&self, json: &str) -> Result<Vec<Arc<Rule<T>>>> {
        let configs: Vec<RuleConfig> = serde_json::from_str(json)?;
        self.read(&configs)
    }

    pub fn read_one(&self, config: &RuleConfig) -> Result<Arc<Rule<T>>> {
        if config.rule_type == RuleKind::Reference {
            return self.resolve_reference(config);
        }

        if !config.rules.is_empty() && !config.rule_type.allows_children() {
            return Err(RuleEvaluationError::NestedRulesNotAllowed {
                rule: config.key(),
                kind: config.rule_type,
            }
            .into());
        }

        let children = self.read(&config.rules)?;
        let rule = Rule::configure(config, children, &self.env)?;
        debug!(rule = %rule.key(), kind = %rule.kind(), "规则已构建");
        Ok(Arc::new(rule))
    }

    fn resolve_reference(&self, config: &RuleConfig) -> Result<Arc<Rule<T>>> {
        if !config.rules.is_empty() {
            return Err(RuleEvaluationError::NestedRulesNotAllowed {
                rule: config.key(),
                kind: config.rule_type,
            }
            .into());
        }

        self.cache
            .as_ref()
            .and_then(|cache| cache.get(&config.namespace, &config.name))
            .ok_or_else(|| RuleEvaluationError::MissingReference(config.key()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RuleError;
    use serde_json::Value;

    #[test]
    fn test_read_json() {
        let reader: RuleConfigReader<Value> = RuleConfigReader::new(RuleEnv::new("order"));
        let rules = reader
            .read_json(
                r#"[
                    {"name": "skip", "ruleType": "filter", "expression": "amount < 0", "errorCode": 1},
                    {"name": "check", "ruleType": "condition", "expression": "amount > 10", "errorCode": 2,
                     "rules": [{"name": "big", "ruleType": "validation", "expression": "amount < 100",
                                "errorCode": 3, "validationErrorCode": 30}]}
                ]"#,
            )
            .unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[1].children().map(|c| c.len()), Some(1));
    }

    #[test]
    fn test_missing_reference() {
        let reader: RuleConfigReader<Value> = RuleConfigReader::new(RuleEnv::new("order"));
        let err = reader
            .read(&[RuleConfig::reference("shared", "absent")])
            .unwrap_err();
        assert!(matches!(
            err,
            RuleError::Evaluation(RuleEvaluationError::MissingReference(ref key)) if key == "shared:absent"
        ));

        let reader = reader.with_cache(RulesCache::new("order"));
        assert!(reader.read(&[RuleConfig::reference("shared", "absent")]).is_err());
    }

    #[test]
    fn test_reference_shares_cached_instance() {
        let cache: RulesCache<Value> = RulesCache::new("order");
        let env = RuleEnv::new("order");
        cache
            .load(&[RuleConfig::filter("skip", "amount < 0", 1).with_namespace("shared")], &env)
            .unwrap();

        let reader = RuleConfigReader::new(env).with_cache(cache.clone());
        let rules = reader.read(&[RuleConfig::reference("shared", "skip")]).unwrap();
        let cached = cache.get("shared", "skip").unwrap();
        assert!(Arc::ptr_eq(&rules[0], &cached));
    }

    #[test]
    fn test_nested_rules_rejected_under_filter() {
        let reader: RuleConfigReader<Value> = RuleConfigReader::new(RuleEnv::new("order"));
        let config = RuleConfig::filter("f", "true", 1)
            .with_rules(vec![RuleConfig::filter("inner", "true", 1)]);
        assert!(matches!(
            reader.read_one(&config),
            Err(RuleError::Evaluation(RuleEvaluationError::NestedRulesNotAllowed { .. }))
        ));
    }
}
