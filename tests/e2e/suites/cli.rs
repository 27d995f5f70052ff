//! 命令行入口测试套件

use crate::data::*;
use crate::setup::TestEnvironment;
use pipeline::cli::run_pipeline;
use serde_json::json;

#[test]
fn test_run_from_files() {
    let env = TestEnvironment::new().unwrap();
    let definition = env
        .write_json(
            "orders.json",
            &json!({
                "name": "orders",
                "settings": {"terminateOnValidationError": false},
                "filters": [{"name": "skip_test", "ruleType": "filter",
                             "expression": "record.test == true", "errorCode": 1}],
                "rules": [{"name": "customer_checks", "ruleType": "reference"}]
            }),
        )
        .unwrap();
    let shared = env
        .write_json("rules.json", &serde_json::to_value(customer_checks()).unwrap())
        .unwrap();

    let mut records = valid_orders(3);
    records.push(test_order("t-1"));
    records.push(json!({"id": "anon", "amount": 5}));
    let input = env.write_lines("orders.jsonl", &records).unwrap();

    let summary = run_pipeline(&definition, Some(&shared), Some(&input), true).unwrap();
    assert_eq!(summary["pipeline"], json!("orders"));
    assert_eq!(summary["recordCount"], json!(5));
    assert_eq!(summary["commitCount"], json!(4));
    assert_eq!(summary["ignoredCount"], json!(1));
    assert_eq!(summary["errorCount"], json!(1));
    assert_eq!(summary["records"].as_array().map(Vec::len), Some(5));
}

#[test]
fn test_run_reports_invalid_input_line() {
    let env = TestEnvironment::new().unwrap();
    let definition = env.write_json("p.json", &json!({"name": "raw"})).unwrap();
    let input = env.write_text("bad.jsonl", "{\"a\": 1}\nnot json\n").unwrap();

    let error = run_pipeline(&definition, None, Some(&input), false).unwrap_err();
    assert!(error.to_string().contains('2'));
}
