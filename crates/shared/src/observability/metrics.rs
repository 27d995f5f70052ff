//! 记录处理指标
//!
//! 只定义指标名称和描述，计数通过 `metrics` 宏在管道中记录。

/// 读取的记录数
pub const RECORDS_READ: &str = "recordflow_records_read_total";
/// 提交成功的记录数
pub const RECORDS_COMMITTED: &str = "recordflow_records_committed_total";
/// 被过滤忽略的记录数
pub const RECORDS_IGNORED: &str = "recordflow_records_ignored_total";
/// 校验失败的记录数
pub const RECORDS_FAILED: &str = "recordflow_records_failed_total";
/// 持久化的校验错误数
pub const VALIDATION_ERRORS_SAVED: &str = "recordflow_validation_errors_saved_total";

/// 注册指标描述
pub fn describe() {
    metrics::describe_counter!(RECORDS_READ, "Total number of records read from a cursor");
    metrics::describe_counter!(RECORDS_COMMITTED, "Total number of records committed to a store");
    metrics::describe_counter!(RECORDS_IGNORED, "Total number of records ignored by filters");
    metrics::describe_counter!(RECORDS_FAILED, "Total number of records rejected by validation");
    metrics::describe_counter!(
        VALIDATION_ERRORS_SAVED,
        "Total number of validation error records persisted"
    );
}
