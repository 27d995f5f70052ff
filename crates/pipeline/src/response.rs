//! 处理结果

use crate::source::SourceMap;
use rule_engine::{EvaluationStatus, RuleValidationError, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 单条记录的处理结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordResponse {
    pub source: SourceMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<Value>,
    pub status: EvaluationStatus,
    pub committed: bool,
    /// 组合管道中各路由的子结果
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<RecordResponse>,
}

impl RecordResponse {
    /// 被过滤忽略
    pub fn ignored(source: SourceMap) -> Self {
        Self {
            source,
            entity: None,
            status: EvaluationStatus::with_status(StatusCode::IgnoreRecord),
            committed: false,
            children: Vec::new(),
        }
    }

    /// 已提交
    pub fn committed(source: SourceMap, entity: Value, status: EvaluationStatus) -> Self {
        Self {
            source,
            entity: Some(entity),
            status,
            committed: true,
            children: Vec::new(),
        }
    }

    /// 因校验错误被拒绝
    pub fn rejected(source: SourceMap, error: RuleValidationError) -> Self {
        let mut status = EvaluationStatus::with_status(StatusCode::ValidationFailed);
        status.add_error(error);
        Self {
            source,
            entity: None,
            status,
            committed: false,
            children: Vec::new(),
        }
    }

    /// 汇总子结果：全部子结果已提交或被忽略且至少一个已提交时，才视为已提交
    pub fn composite(source: SourceMap, children: Vec<RecordResponse>) -> Self {
        let committed = children.iter().any(|c| c.committed)
            && children.iter().all(|c| c.committed || c.is_ignored());

        // 被忽略的子结果不参与状态合并
        let mut status = EvaluationStatus::success();
        let mut active = children.iter().filter(|c| !c.is_ignored()).peekable();
        if active.peek().is_none() {
            status.status = StatusCode::IgnoreRecord;
        }
        for child in active {
            status.merge(child.status.clone());
        }

        Self {
            source,
            entity: None,
            status,
            committed,
            children,
        }
    }

    pub fn is_ignored(&self) -> bool {
        !self.committed && self.status.status == StatusCode::IgnoreRecord
    }

    /// 本记录（含子结果）收集到的校验错误数
    pub fn error_count(&self) -> usize {
        if self.children.is_empty() {
            self.status.errors.len()
        } else {
            self.children.iter().map(RecordResponse::error_count).sum()
        }
    }
}

/// 一次游标遍历的处理结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadResponse {
    pub record_count: usize,
    pub commit_count: usize,
    pub records: Vec<RecordResponse>,
}

impl ReadResponse {
    pub fn error_count(&self) -> usize {
        self.records.iter().map(RecordResponse::error_count).sum()
    }

    pub fn ignored_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_ignored()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| !r.committed && !r.is_ignored())
            .count()
    }
}
