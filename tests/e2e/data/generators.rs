//! 测试记录生成

use serde_json::{Value, json};

/// 生成 n 条合法订单
pub fn valid_orders(n: usize) -> Vec<Value> {
    (0..n)
        .map(|i| {
            json!({
                "id": format!("order-{i}"),
                "amount": (i + 1) * 10,
                "customer": format!("c-{}", i % 3),
                "vip": i % 2 == 0,
            })
        })
        .collect()
}

pub fn invalid_order(id: &str) -> Value {
    json!({"id": id, "amount": -1, "customer": "c-x"})
}

pub fn test_order(id: &str) -> Value {
    json!({"id": id, "amount": 1, "customer": "c-t", "test": true})
}

pub fn invoice(lines: usize) -> Value {
    let lines: Vec<Value> = (0..lines)
        .map(|i| json!({"sku": format!("sku-{i}"), "qty": i + 1}))
        .collect();
    json!({
        "header": {"no": "INV-001", "customer": "c-1"},
        "lines": lines,
        "audit": {"by": "importer"},
    })
}
