//! 订单导入测试套件
//!
//! 验证过滤、转换、校验、规则引用与两种批处理策略在完整管道中的表现。

use crate::data::*;
use crate::setup::TestEnvironment;
use crate::{assert_entity_count, assert_read};
use pipeline::{Context, PipelineError, VecReader};
use rule_engine::StatusCode;
use serde_json::json;

fn env() -> TestEnvironment {
    TestEnvironment::new().unwrap().with_shared_rules(customer_checks())
}

#[test]
fn test_valid_orders_are_committed() {
    let env = env();
    let mut pipeline = env.build(&order_import(true, false)).unwrap();

    let mut reader = VecReader::from_values(valid_orders(6)).unwrap();
    let response = pipeline.read_from(&mut reader, &mut Context::new()).unwrap();

    assert_read!(response, records = 6, commits = 6);
    assert_eq!(response.error_count(), 0);
    assert_entity_count!(env.store, "orders", 6);

    let saved = env.store.entities("orders");
    assert!(saved.iter().all(|o| o["currency"] == json!("CNY")));
    // 条件规则只对 VIP 订单执行子规则
    let vip: Vec<_> = saved.iter().filter(|o| o["vip"] == json!(true)).collect();
    assert!(vip.iter().all(|o| o["discount"] == json!(0.1)));
    assert!(saved.iter().filter(|o| o["vip"] == json!(false)).all(|o| o.get("discount").is_none()));
}

#[test]
fn test_condition_miss_marks_status_failed_but_persists() {
    let env = env();
    let mut pipeline = env.build(&order_import(true, false)).unwrap();

    let mut reader = VecReader::from_values(vec![json!({"amount": 5, "customer": "c", "vip": false})]).unwrap();
    let response = pipeline.read_from(&mut reader, &mut Context::new()).unwrap();

    assert_eq!(response.records[0].status.status, StatusCode::Failed);
    assert!(response.records[0].committed);
}

#[test]
fn test_fail_fast_stops_at_first_invalid_record() {
    let env = env();
    let mut pipeline = env.build(&order_import(true, true)).unwrap();

    let mut records = valid_orders(2);
    records.push(invalid_order("bad-1"));
    records.extend(valid_orders(2));
    let mut reader = VecReader::from_values(records).unwrap();

    let result = pipeline.read_from(&mut reader, &mut Context::new());
    let Err(PipelineError::Aborted { response, cause }) = result else {
        panic!("应当因校验错误中止");
    };
    assert_read!(response, records = 3, commits = 2);
    assert_eq!(cause.rule_name, "positive_amount");
    assert_eq!(cause.field.as_deref(), Some("amount"));
    assert_entity_count!(env.store, "orders", 2);
    // 快速失败模式下错误不落库
    assert!(env.store.validation_errors().is_empty());
}

#[test]
fn test_collect_mode_persists_errors_alongside_entities() {
    let env = env();
    let mut pipeline = env.build(&order_import(false, true)).unwrap();

    let mut records = valid_orders(2);
    records.push(invalid_order("bad-1"));
    records.push(json!({"id": "bad-2", "amount": -3}));
    let mut reader = VecReader::from_values(records).unwrap();

    let response = pipeline.read_from(&mut reader, &mut Context::new()).unwrap();
    assert_read!(response, records = 4, commits = 4);
    assert_eq!(response.error_count(), 3);

    let errors = env.store.validation_errors();
    let codes: Vec<i64> = errors.iter().map(|e| e.validation_error_code).collect();
    assert_eq!(codes, vec![100, 100, 200]);
    assert_eq!(errors[2].source["id"], json!("bad-2"));
}

#[test]
fn test_collect_mode_without_saving_errors() {
    let env = env();
    let mut pipeline = env.build(&order_import(false, false)).unwrap();

    let mut reader = VecReader::from_values(vec![invalid_order("bad-1")]).unwrap();
    let response = pipeline.read_from(&mut reader, &mut Context::new()).unwrap();

    assert_eq!(response.error_count(), 1);
    assert_eq!(response.records[0].status.status, StatusCode::ValidationFailed);
    assert!(env.store.validation_errors().is_empty());
}

#[test]
fn test_test_orders_are_ignored() {
    let env = env();
    let mut pipeline = env.build(&order_import(true, false)).unwrap();

    let mut records = valid_orders(1);
    records.push(test_order("t-1"));
    let mut reader = VecReader::from_values(records).unwrap();

    let response = pipeline.read_from(&mut reader, &mut Context::new()).unwrap();
    assert_read!(response, records = 2, commits = 1);
    assert_eq!(response.ignored_count(), 1);
    assert_entity_count!(env.store, "orders", 1);
}

#[test]
fn test_missing_shared_rules_fail_build() {
    let env = TestEnvironment::new().unwrap();
    assert!(env.build(&order_import(true, false)).is_err());
}
