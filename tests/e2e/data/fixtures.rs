//! 预定义的管道声明与共享规则

use crate::setup::STORE;
use pipeline::{PipelineConfig, PipelineSettings, RouteConfig};
use rule_engine::RuleConfig;
use serde_json::{Value, json};

/// 订单导入：过滤测试数据，补全默认值，校验金额
pub fn order_import(terminate: bool, save_errors: bool) -> PipelineConfig {
    PipelineConfig::new("orders", "transformer")
        .with_store(STORE)
        .with_settings(PipelineSettings {
            terminate_on_validation_error: terminate,
            save_validation_errors: save_errors,
            entity_type: None,
        })
        .with_filters(vec![RuleConfig::filter("skip_test", "record.test == true", 1)])
        .with_rules(vec![
            RuleConfig::transformation("default_currency", r#"if !("currency" in record) { record.currency = "CNY"; }"#, 2),
            RuleConfig::validation("positive_amount", "amount > 0", 3, 100).with_field("amount"),
            RuleConfig::reference("default", "customer_checks"),
        ])
}

/// 客户信息校验规则组，按名称被订单导入引用
pub fn customer_checks() -> Vec<RuleConfig> {
    vec![RuleConfig::group(
        "customer_checks",
        vec![
            RuleConfig::validation("customer_present", r#""customer" in record"#, 4, 200).with_field("customer"),
            RuleConfig::condition("vip_only", "record.vip == true", 5).with_rules(vec![RuleConfig::transformation(
                "vip_discount",
                "record.discount = 0.1;",
                6,
            )]),
        ],
    )]
}

/// 发票拆分：抬头、明细、审计三路串行
pub fn invoice_split() -> PipelineConfig {
    PipelineConfig::new("invoice", "composite")
        .with_route(
            RouteConfig::new("$.header", PipelineConfig::new("invoice_header", "transformer").with_store(STORE))
                .add_to_context(Some("header")),
        )
        .with_route(
            RouteConfig::new(
                "$.lines",
                PipelineConfig::new("invoice_line", "transformer")
                    .with_store(STORE)
                    .with_rules(vec![RuleConfig::validation("qty_positive", "qty > 0", 1, 10)]),
            )
            .with_filter_predicate("!(record.skip == true)"),
        )
        .with_route(
            RouteConfig::new("$.audit", PipelineConfig::new("invoice_audit", "transformer").with_store(STORE))
                .ignorable()
                .reset_context(),
        )
}

/// 客户与地址嵌套：每个客户实体回填后再展开其地址
pub fn customer_addresses() -> Value {
    json!({
        "name": "customers",
        "pipelineType": "composite",
        "nested": true,
        "routes": [
            {
                "pathExpression": "$.customers",
                "addToContext": true,
                "contextKey": "customer",
                "pipeline": {"name": "customer", "store": STORE}
            },
            {
                "pathExpression": "$.customer.addresses",
                "pipeline": {
                    "name": "address",
                    "store": STORE,
                    "rules": [
                        {"name": "country_default", "ruleType": "transformation",
                         "expression": "if !(\"country\" in record) { record.country = \"CN\"; }", "errorCode": 1}
                    ]
                }
            }
        ]
    })
}
