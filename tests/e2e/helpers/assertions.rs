//! 自定义断言宏

/// 断言存储中某实体类型的数量
#[macro_export]
macro_rules! assert_entity_count {
    ($store:expr, $entity_type:expr, $expected:expr) => {
        let count = $store.entity_count($entity_type);
        assert_eq!(
            count, $expected,
            "实体 {} 数量应为 {}，实际为 {}",
            $entity_type, $expected, count
        );
    };
}

/// 断言读取结果的记录数、提交数
#[macro_export]
macro_rules! assert_read {
    ($response:expr, records = $records:expr, commits = $commits:expr) => {
        assert_eq!($response.record_count, $records, "记录数不符");
        assert_eq!($response.commit_count, $commits, "提交数不符");
    };
}
