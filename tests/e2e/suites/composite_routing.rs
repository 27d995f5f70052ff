//! 组合管道测试套件

use crate::data::*;
use crate::setup::TestEnvironment;
use crate::{assert_entity_count, assert_read};
use pipeline::{Context, PipelineConfig, PipelineError, VecReader};
use serde_json::json;

#[test]
fn test_invoice_split_serial() {
    let env = TestEnvironment::new().unwrap();
    let mut pipeline = env.build(&invoice_split()).unwrap();

    let mut reader = VecReader::from_values(vec![invoice(3)]).unwrap();
    let response = pipeline.read_from(&mut reader, &mut Context::new()).unwrap();

    assert_read!(response, records = 1, commits = 1);
    assert_eq!(response.records[0].children.len(), 5);
    assert_entity_count!(env.store, "invoice_header", 1);
    assert_entity_count!(env.store, "invoice_line", 3);
    assert_entity_count!(env.store, "invoice_audit", 1);
}

#[test]
fn test_invoice_predicate_skips_lines() {
    let env = TestEnvironment::new().unwrap();
    let mut pipeline = env.build(&invoice_split()).unwrap();

    let mut document = invoice(3);
    document["lines"][1]["skip"] = json!(true);
    let mut reader = VecReader::from_values(vec![document]).unwrap();
    pipeline.read_from(&mut reader, &mut Context::new()).unwrap();

    assert_entity_count!(env.store, "invoice_line", 2);
}

#[test]
fn test_invoice_without_audit_is_ignorable() {
    let env = TestEnvironment::new().unwrap();
    let mut pipeline = env.build(&invoice_split()).unwrap();

    let mut document = invoice(1);
    document.as_object_mut().unwrap().remove("audit");
    let mut reader = VecReader::from_values(vec![document]).unwrap();
    let response = pipeline.read_from(&mut reader, &mut Context::new()).unwrap();

    assert_read!(response, records = 1, commits = 1);
    assert_entity_count!(env.store, "invoice_audit", 0);
}

#[test]
fn test_invoice_without_lines_fails() {
    let env = TestEnvironment::new().unwrap();
    let mut pipeline = env.build(&invoice_split()).unwrap();

    let mut document = invoice(0);
    document.as_object_mut().unwrap().remove("lines");
    let mut reader = VecReader::from_values(vec![document]).unwrap();
    let err = pipeline.read_from(&mut reader, &mut Context::new()).unwrap_err();

    assert!(matches!(err.root_cause(), PipelineError::RouteNotMatched { .. }));
    assert_read!(err.partial_response().unwrap(), records = 1, commits = 0);
}

#[test]
fn test_invalid_line_aborts_document() {
    let env = TestEnvironment::new().unwrap();
    let mut pipeline = env.build(&invoice_split()).unwrap();

    let mut document = invoice(2);
    document["lines"][1]["qty"] = json!(0);
    let mut reader = VecReader::from_values(vec![document]).unwrap();
    let result = pipeline.read_from(&mut reader, &mut Context::new());

    let Err(PipelineError::Aborted { cause, .. }) = result else {
        panic!("应当因明细校验失败中止");
    };
    assert_eq!(cause.validation_error_code, 10);
    assert_eq!(cause.entity_type, "invoice_line");
}

#[test]
fn test_nested_customer_addresses() {
    let env = TestEnvironment::new().unwrap();
    let config: PipelineConfig = serde_json::from_value(customer_addresses()).unwrap();
    let mut pipeline = env.build(&config).unwrap();

    let document = json!({
        "customers": [
            {"name": "a", "addresses": [{"city": "Shanghai"}, {"city": "Lyon", "country": "FR"}]},
            {"name": "b", "addresses": [{"city": "Beijing"}]}
        ]
    });
    let mut reader = VecReader::from_values(vec![document]).unwrap();
    let response = pipeline.read_from(&mut reader, &mut Context::new()).unwrap();

    assert_read!(response, records = 1, commits = 1);
    assert_entity_count!(env.store, "customer", 2);
    assert_entity_count!(env.store, "address", 3);

    let countries: Vec<_> = env
        .store
        .entities("address")
        .iter()
        .map(|a| a["country"].clone())
        .collect();
    assert_eq!(countries, vec![json!("CN"), json!("FR"), json!("CN")]);
}
