//! 管道家族
//!
//! - [`ExecutablePipeline`]：准入过滤 → 映射 → 处理规则
//! - [`PersistencePipeline`]：在事务中保存实体和校验错误
//! - [`EntityPipeline`] / [`TransformerPipeline`]：驱动读取循环的具体管道
//! - [`CompositePipeline`]：把一条记录按路径拆分并路由到多个子管道

mod composite;
mod entity;
mod executable;
mod persistence;

pub use composite::{CompositePipeline, PipelineInfo};
pub use entity::{EntityPipeline, TransformerPipeline};
pub use executable::ExecutablePipeline;
pub use persistence::PersistencePipeline;

use crate::config::PipelineSettings;
use crate::context::Context;
use crate::error::{PipelineError, Result};
use crate::response::{ReadResponse, RecordResponse};
use crate::source::{InputReader, ReadCursor, SourceMap};
use metrics::counter;
use recordflow_shared::observability::metrics::{
    RECORDS_COMMITTED, RECORDS_FAILED, RECORDS_IGNORED, RECORDS_READ,
};
use tracing::{info, warn};

fn interrupted(pipeline: &str, response: ReadResponse, cause: PipelineError) -> PipelineError {
    warn!(
        pipeline = %pipeline,
        records = response.record_count,
        commits = response.commit_count,
        "读取中断: {}",
        cause
    );
    PipelineError::Failed {
        response: Box::new(response),
        cause: Box::new(cause),
    }
}

pub trait Pipeline: Send {
    fn name(&self) -> &str;

    fn settings(&self) -> &PipelineSettings;

    /// 处理一条记录
    fn process(&mut self, source: SourceMap, context: &mut Context) -> Result<RecordResponse>;

    /// 遍历游标处理所有记录
    ///
    /// 校验失败时，终止模式返回 [`PipelineError::Aborted`]，否则记录失败并继续。
    /// 游标、映射、存储或引擎错误返回 [`PipelineError::Failed`]。两者都携带已处理部分。
    fn read(&mut self, cursor: &mut dyn ReadCursor, context: &mut Context) -> Result<ReadResponse> {
        let pipeline = self.name().to_string();
        let mut response = ReadResponse::default();

        loop {
            let source = match cursor.next() {
                Ok(Some(source)) => source,
                Ok(None) => break,
                Err(e) => return Err(interrupted(&pipeline, response, e)),
            };
            response.record_count += 1;
            counter!(RECORDS_READ, "pipeline" => pipeline.clone()).increment(1);

            match self.process(source.clone(), context) {
                Ok(record) => {
                    if record.committed {
                        response.commit_count += 1;
                        counter!(RECORDS_COMMITTED, "pipeline" => pipeline.clone()).increment(1);
                    } else if record.is_ignored() {
                        counter!(RECORDS_IGNORED, "pipeline" => pipeline.clone()).increment(1);
                    }
                    response.records.push(record);
                }
                Err(PipelineError::Validation(cause)) => {
                    counter!(RECORDS_FAILED, "pipeline" => pipeline.clone()).increment(1);
                    warn!(
                        pipeline = %pipeline,
                        record = response.record_count,
                        rule = %cause.rule_name,
                        code = cause.validation_error_code,
                        "记录校验失败: {}",
                        cause.message
                    );
                    response
                        .records
                        .push(RecordResponse::rejected(source, (*cause).clone()));

                    if self.settings().terminate_on_validation_error {
                        return Err(PipelineError::Aborted {
                            response: Box::new(response),
                            cause,
                        });
                    }
                }
                Err(e) => {
                    counter!(RECORDS_FAILED, "pipeline" => pipeline.clone()).increment(1);
                    return Err(interrupted(&pipeline, response, e));
                }
            }
        }

        info!(
            pipeline = %pipeline,
            records = response.record_count,
            commits = response.commit_count,
            errors = response.error_count(),
            "读取完成"
        );
        Ok(response)
    }

    /// 打开输入源并读取
    fn read_from(&mut self, reader: &mut dyn InputReader, context: &mut Context) -> Result<ReadResponse> {
        let mut cursor = reader.open()?;
        self.read(cursor.as_mut(), context)
    }
}
