//! 规则评估目标
//!
//! 规则不关心输入的具体类型，只通过 JSON 绑定读写数据。

use serde_json::{Map, Value};

/// 可被规则评估的输入
pub trait RuleTarget {
    /// 表达式可见的数据（通常是一个 JSON 对象）
    fn bindings(&self) -> serde_json::Result<Value>;

    /// 将转换规则修改后的绑定写回输入
    fn apply_bindings(&mut self, bindings: Value) -> serde_json::Result<()>;
}

impl RuleTarget for Value {
    fn bindings(&self) -> serde_json::Result<Value> {
        Ok(self.clone())
    }

    fn apply_bindings(&mut self, bindings: Value) -> serde_json::Result<()> {
        *self = bindings;
        Ok(())
    }
}

impl RuleTarget for Map<String, Value> {
    fn bindings(&self) -> serde_json::Result<Value> {
        Ok(Value::Object(self.clone()))
    }

    fn apply_bindings(&mut self, bindings: Value) -> serde_json::Result<()> {
        *self = serde_json::from_value(bindings)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_map_target_rejects_non_object() {
        let mut map = Map::new();
        assert!(map.apply_bindings(json!([1, 2])).is_err());
        assert!(map.apply_bindings(json!({"a": 1})).is_ok());
        assert_eq!(map["a"], json!(1));
    }
}
