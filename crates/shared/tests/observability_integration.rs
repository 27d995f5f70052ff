//! 可观测性模块集成测试

mod metrics_tests {
    use metrics::counter;
    use recordflow_shared::observability::metrics::{
        RECORDS_COMMITTED, RECORDS_FAILED, RECORDS_IGNORED, RECORDS_READ, VALIDATION_ERRORS_SAVED, describe,
    };

    #[test]
    fn test_metric_names_are_prefixed() {
        for name in [
            RECORDS_READ,
            RECORDS_COMMITTED,
            RECORDS_IGNORED,
            RECORDS_FAILED,
            VALIDATION_ERRORS_SAVED,
        ] {
            assert!(name.starts_with("recordflow_"));
            assert!(name.ends_with("_total"));
        }
    }

    #[test]
    fn test_record_without_recorder() {
        // 未安装 recorder 时记录为空操作
        describe();
        counter!(RECORDS_READ, "pipeline" => "orders").increment(1);
        counter!(RECORDS_COMMITTED, "pipeline" => "orders").increment(1);
    }
}

mod tracing_tests {
    use recordflow_shared::ObservabilityConfig;
    use recordflow_shared::observability::tracing::env_filter;

    #[test]
    fn test_env_filter_uses_config_level() {
        let config = ObservabilityConfig {
            log_level: "debug,rule_engine=trace".to_string(),
            ..Default::default()
        };
        let filter = env_filter(&config);
        if std::env::var("RUST_LOG").is_err() {
            assert!(filter.to_string().contains("rule_engine=trace"));
        }
    }

    #[test]
    fn test_init_twice_fails() {
        let config = ObservabilityConfig::default();
        let first = recordflow_shared::observability::init(&config);
        let second = recordflow_shared::observability::init(&config);
        assert!(first.is_ok());
        assert!(second.is_err());
    }
}

mod config_tests {
    use recordflow_shared::AppConfig;
    use std::path::PathBuf;

    #[test]
    fn test_pipeline_section_from_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("default.toml"),
            r#"
            [pipeline]
            definition = "pipelines/orders.json"
            input = "data/orders.jsonl"

            [observability]
            json_logs = true
            "#,
        )
        .unwrap();

        let config = AppConfig::load_from(dir.path(), "recordflow").unwrap();
        assert_eq!(config.service_name, "recordflow");
        assert_eq!(config.pipeline.definition, Some(PathBuf::from("pipelines/orders.json")));
        assert_eq!(config.pipeline.input, Some(PathBuf::from("data/orders.jsonl")));
        assert!(config.pipeline.shared_rules.is_none());
        assert!(config.observability.json_logs);
    }
}
