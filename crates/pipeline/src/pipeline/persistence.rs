//! 持久化管道：在存储事务中保存实体与校验错误

use super::executable::ExecutablePipeline;
use crate::config::{PipelineConfig, PipelineEnv, PipelineSettings};
use crate::context::Context;
use crate::error::{Result, StoreError};
use crate::mapping::Entity;
use crate::response::RecordResponse;
use crate::source::SourceMap;
use crate::store::{DataStore, MEMORY_STORE, ValidationErrorRecord};
use metrics::counter;
use recordflow_shared::observability::metrics::VALIDATION_ERRORS_SAVED;
use rule_engine::{RuleValidationError, StatusCode};
use serde_json::Value;
use std::fmt;
use tracing::{debug, instrument, warn};

pub struct PersistencePipeline<E> {
    executable: ExecutablePipeline<E>,
    store: Box<dyn DataStore>,
    transaction_active: bool,
}

impl<E> fmt::Debug for PersistencePipeline<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistencePipeline")
            .field("executable", &self.executable)
            .field("transaction_active", &self.transaction_active)
            .finish()
    }
}

impl<E: Entity> PersistencePipeline<E> {
    pub fn new(executable: ExecutablePipeline<E>, store: Box<dyn DataStore>) -> Self {
        Self {
            executable,
            store,
            transaction_active: false,
        }
    }

    pub fn configure(config: &PipelineConfig, env: &PipelineEnv<E>, default_mapper: Option<&str>) -> Result<Self> {
        let executable = ExecutablePipeline::configure(config, env, default_mapper)?;
        let store = env.stores.create(config.store.as_deref().unwrap_or(MEMORY_STORE))?;
        Ok(Self::new(executable, store))
    }

    pub fn executable(&self) -> &ExecutablePipeline<E> {
        &self.executable
    }

    pub fn name(&self) -> &str {
        self.executable.name()
    }

    pub fn settings(&self) -> &PipelineSettings {
        self.executable.settings()
    }

    /// 保存实体，返回存储后的文档
    pub fn save(&mut self, entity: &E, context: &Context) -> Result<Value> {
        let document = serde_json::to_value(entity)?;
        Ok(self.store.create(document, self.executable.entity_type(), context)?)
    }

    /// 按设置为每个校验错误写入错误记录，返回写入条数
    pub fn save_errors(
        &mut self,
        errors: &[RuleValidationError],
        source: &SourceMap,
        context: &Context,
    ) -> Result<usize> {
        if !self.settings().save_validation_errors || errors.is_empty() {
            return Ok(0);
        }

        for error in errors {
            let record = ValidationErrorRecord::new(error, source);
            self.store.create_validation_error(&record, context)?;
        }
        counter!(VALIDATION_ERRORS_SAVED, "pipeline" => self.name().to_string())
            .increment(errors.len() as u64);
        Ok(errors.len())
    }

    pub fn begin_transaction(&mut self) -> Result<()> {
        if self.store.supports_transactions() {
            self.store.begin_transaction()?;
            self.transaction_active = true;
        }
        Ok(())
    }

    pub fn commit(&mut self) -> Result<()> {
        if !self.store.supports_transactions() {
            return Ok(());
        }
        if !self.transaction_active {
            return Err(StoreError::NoActiveTransaction.into());
        }
        self.store.commit()?;
        self.transaction_active = false;
        Ok(())
    }

    /// 强制回滚，没有活动事务时不报错
    pub fn rollback(&mut self) -> Result<()> {
        self.transaction_active = false;
        self.store.rollback(true)?;
        Ok(())
    }

    /// 准入 → 映射 → 保存 → 提交；任一步骤失败都会回滚
    #[instrument(skip(self, source, context), fields(pipeline = %self.name()))]
    pub fn process_record(&mut self, mut source: SourceMap, context: &Context) -> Result<RecordResponse> {
        if !self.executable.admit(&mut source)? {
            debug!("记录被过滤");
            return Ok(RecordResponse::ignored(source));
        }

        let mapped = self.executable.map(&source, context)?;
        if mapped.status.status == StatusCode::IgnoreRecord {
            debug!("记录被处理规则忽略");
            return Ok(RecordResponse::ignored(mapped.source));
        }

        self.begin_transaction()?;
        let persisted = self.persist(&mapped.entity, &mapped.status.errors, &mapped.source, context);
        match persisted.and_then(|document| self.commit().map(|_| document)) {
            Ok(document) => Ok(RecordResponse::committed(mapped.source, document, mapped.status)),
            Err(e) => {
                if let Err(rollback) = self.rollback() {
                    warn!(error = %rollback, "回滚失败");
                }
                Err(e)
            }
        }
    }

    fn persist(
        &mut self,
        entity: &E,
        errors: &[RuleValidationError],
        source: &SourceMap,
        context: &Context,
    ) -> Result<Value> {
        let document = self.save(entity, context)?;
        self.save_errors(errors, source, context)?;
        Ok(document)
    }
}
