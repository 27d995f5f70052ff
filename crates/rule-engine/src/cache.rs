//! 规则缓存
//!
//! 使用 DashMap 保存按 `namespace:name` 注册的规则实例，供引用规则复用。
//! 每个缓存绑定一种实体类型。

use crate::error::Result;
use crate::models::{RuleConfig, RuleKind, rule_key};
use crate::reader::RuleConfigReader;
use crate::rule::{Rule, RuleEnv};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// 规则缓存
pub struct RulesCache<T> {
    entity_type: String,
    rules: Arc<DashMap<String, Arc<Rule<T>>>>,
}

impl<T> Clone for RulesCache<T> {
    fn clone(&self) -> Self {
        Self {
            entity_type: self.entity_type.clone(),
            rules: self.rules.clone(),
        }
    }
}

impl<T> std::fmt::Debug for RulesCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RulesCache")
            .field("entity_type", &self.entity_type)
            .field("rules", &self.names())
            .finish()
    }
}

impl<T> RulesCache<T> {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            rules: Arc::new(DashMap::new()),
        }
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// 注册规则，同名规则会被替换
    pub fn register(&self, rule: Arc<Rule<T>>) {
        let key = rule.key();
        if self.rules.insert(key.clone(), rule).is_some() {
            warn!(entity_type = %self.entity_type, "替换已存在的规则: {}", key);
        }
    }

    pub fn get(&self, namespace: &str, name: &str) -> Option<Arc<Rule<T>>> {
        self.rules.get(&rule_key(namespace, name)).map(|r| r.value().clone())
    }

    pub fn contains(&self, namespace: &str, name: &str) -> bool {
        self.rules.contains_key(&rule_key(namespace, name))
    }

    /// 删除规则，返回是否存在
    pub fn remove(&self, namespace: &str, name: &str) -> bool {
        self.rules.remove(&rule_key(namespace, name)).is_some()
    }

    /// 所有规则键（已排序）
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.rules.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    #[instrument(skip(self), fields(entity_type = %self.entity_type))]
    pub fn clear(&self) {
        let count = self.rules.len();
        self.rules.clear();
        info!("已清空 {} 条规则", count);
    }

    pub fn stats(&self) -> RulesCacheStats {
        let mut stats = RulesCacheStats {
            rules_count: self.rules.len(),
            ..Default::default()
        };
        for entry in self.rules.iter() {
            let rule = entry.value();
            match rule.kind() {
                RuleKind::Group => stats.groups += 1,
                RuleKind::Filter => stats.filters += 1,
                RuleKind::Validation => stats.validations += 1,
                _ => {}
            }
            stats.total_children += rule.children().map(|c| c.len()).unwrap_or(0);
        }
        stats
    }

    /// 按顺序构建并注册规则，后面的声明可以引用前面已注册的规则
    #[instrument(skip(self, configs, env), fields(entity_type = %self.entity_type, count = configs.len()))]
    pub fn load(&self, configs: &[RuleConfig], env: &RuleEnv) -> Result<Vec<String>> {
        let reader = RuleConfigReader::new(env.clone()).with_cache(self.clone());
        let mut keys = Vec::with_capacity(configs.len());
        for config in configs {
            let rule = reader.read_one(config)?;
            keys.push(rule.key());
            self.register(rule);
        }

        info!("规则缓存加载完成: {} 条", keys.len());
        Ok(keys)
    }
}

/// 规则缓存统计信息
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RulesCacheStats {
    /// 规则总数
    pub rules_count: usize,
    pub groups: usize,
    pub filters: usize,
    pub validations: usize,
    /// 所有顶层规则的直接子规则数
    pub total_children: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::thread;

    fn shared_rules() -> Vec<RuleConfig> {
        vec![
            RuleConfig::group(
                "amount_checks",
                vec![
                    RuleConfig::validation("positive", "amount > 0", 1, 100),
                    RuleConfig::validation("bounded", "amount < 1000", 1, 101),
                ],
            )
            .with_namespace("shared"),
            RuleConfig::filter("skip_test", "test == true", 2).with_namespace("shared"),
        ]
    }

    #[test]
    fn test_load_and_get() {
        let cache: RulesCache<Value> = RulesCache::new("order");
        let keys = cache.load(&shared_rules(), &RuleEnv::new("order")).unwrap();
        assert_eq!(keys, vec!["shared:amount_checks", "shared:skip_test"]);
        assert_eq!(cache.len(), 2);
        assert!(cache.contains("shared", "skip_test"));
        assert!(cache.get("default", "skip_test").is_none());

        let stats = cache.stats();
        assert_eq!(stats.groups, 1);
        assert_eq!(stats.filters, 1);
        assert_eq!(stats.total_children, 2);
    }

    #[test]
    fn test_load_resolves_earlier_entries() {
        let cache: RulesCache<Value> = RulesCache::new("order");
        let mut configs = shared_rules();
        configs.push(RuleConfig::group(
            "all",
            vec![RuleConfig::reference("shared", "amount_checks")],
        ));
        cache.load(&configs, &RuleEnv::new("order")).unwrap();
        assert!(cache.contains("default", "all"));
    }

    #[test]
    fn test_remove_and_clear() {
        let cache: RulesCache<Value> = RulesCache::new("order");
        cache.load(&shared_rules(), &RuleEnv::new("order")).unwrap();
        assert!(cache.remove("shared", "skip_test"));
        assert!(!cache.remove("shared", "skip_test"));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_access() {
        let cache: RulesCache<Value> = RulesCache::new("order");
        let env = RuleEnv::new("order");

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                let env = env.clone();
                thread::spawn(move || {
                    let config = RuleConfig::filter(format!("f{}", i), "false", 1);
                    cache.load(&[config], &env).unwrap();
                    cache.get("default", &format!("f{}", i)).is_some()
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(cache.len(), 8);
    }
}
