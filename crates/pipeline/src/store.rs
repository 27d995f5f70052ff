//! 数据存储
//!
//! [`DataStore`] 是管道持久化的唯一出口。具体的数据库驱动由外部提供，
//! 这里内置支持事务的 [`InMemoryStore`]。

use crate::context::Context;
use crate::error::StoreError;
use crate::source::SourceMap;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rule_engine::RuleValidationError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// 默认存储名称
pub const MEMORY_STORE: &str = "memory";

/// 实体主键字段
pub const ID_FIELD: &str = "id";

/// 持久化的校验错误记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationErrorRecord {
    pub id: String,
    pub rule_name: String,
    pub namespace: String,
    pub entity_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub error_code: i64,
    pub validation_error_code: i64,
    pub message: String,
    pub source: SourceMap,
    pub recorded_at: DateTime<Utc>,
}

impl ValidationErrorRecord {
    pub fn new(error: &RuleValidationError, source: &SourceMap) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            rule_name: error.rule_name.clone(),
            namespace: error.namespace.clone(),
            entity_type: error.entity_type.clone(),
            field: error.field.clone(),
            error_code: error.error_code,
            validation_error_code: error.validation_error_code,
            message: error.message.clone(),
            source: source.clone(),
            recorded_at: Utc::now(),
        }
    }
}

/// 数据存储接口
///
/// 事务相关方法默认是空操作，只有 `supports_transactions` 返回 true 的存储才需要实现。
#[cfg_attr(test, mockall::automock)]
pub trait DataStore: Send {
    fn create(&mut self, entity: Value, entity_type: &str, context: &Context) -> StoreResult<Value>;

    fn update(&mut self, entity: Value, entity_type: &str, context: &Context) -> StoreResult<Value>;

    fn upsert(&mut self, entity: Value, entity_type: &str, context: &Context) -> StoreResult<Value>;

    fn delete(&mut self, entity: &Value, entity_type: &str, context: &Context) -> StoreResult<()>;

    fn create_validation_error(
        &mut self,
        record: &ValidationErrorRecord,
        context: &Context,
    ) -> StoreResult<()>;

    fn supports_transactions(&self) -> bool {
        false
    }

    fn begin_transaction(&mut self) -> StoreResult<()> {
        Ok(())
    }

    fn commit(&mut self) -> StoreResult<()> {
        Ok(())
    }

    /// `force` 为 true 时，没有活动事务也不报错
    fn rollback(&mut self, force: bool) -> StoreResult<()> {
        let _ = force;
        Ok(())
    }
}

/// 单一实体类型的文档集合，按主键建立索引，保持写入顺序
#[derive(Debug, Default)]
struct Collection {
    slots: Vec<Option<Value>>,
    index: HashMap<String, usize>,
    live: usize,
}

impl Collection {
    fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// 主键已存在时原位替换，否则追加
    fn put(&mut self, entity: Value) {
        let id = entity_id(&entity);
        if let Some(slot) = id.as_ref().and_then(|id| self.index.get(id).copied()) {
            self.slots[slot] = Some(entity);
            return;
        }
        if let Some(id) = id {
            self.index.insert(id, self.slots.len());
        }
        self.slots.push(Some(entity));
        self.live += 1;
    }

    fn remove(&mut self, id: &str) {
        if let Some(slot) = self.index.remove(id) {
            self.slots[slot] = None;
            self.live -= 1;
        }
    }

    fn values(&self) -> impl Iterator<Item = &Value> {
        self.slots.iter().flatten()
    }

    fn len(&self) -> usize {
        self.live
    }
}

/// 事务中暂存的写操作，提交时按顺序应用
#[derive(Debug)]
enum Operation {
    Put { entity_type: String, entity: Value },
    Delete { entity_type: String, id: String },
    ValidationError(ValidationErrorRecord),
}

#[derive(Debug, Default)]
struct Transaction {
    log: Vec<Operation>,
    /// 事务内写过的主键：true 为存在，false 为已删除
    touched: HashMap<String, HashMap<String, bool>>,
}

impl Transaction {
    fn track(&mut self, operation: &Operation) {
        let (entity_type, id, exists) = match operation {
            Operation::Put { entity_type, entity } => match entity_id(entity) {
                Some(id) => (entity_type, id, true),
                None => return,
            },
            Operation::Delete { entity_type, id } => (entity_type, id.clone(), false),
            Operation::ValidationError(_) => return,
        };
        self.touched
            .entry(entity_type.clone())
            .or_default()
            .insert(id, exists);
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    entities: HashMap<String, Collection>,
    validation_errors: Vec<ValidationErrorRecord>,
    transaction: Option<Transaction>,
}

impl MemoryState {
    /// 已提交数据叠加当前事务的写入后，主键是否存在
    fn exists(&self, entity_type: &str, id: &str) -> bool {
        let staged = self
            .transaction
            .as_ref()
            .and_then(|tx| tx.touched.get(entity_type))
            .and_then(|ids| ids.get(id));
        match staged {
            Some(exists) => *exists,
            None => self.entities.get(entity_type).is_some_and(|c| c.contains(id)),
        }
    }

    /// 事务中写入操作日志，否则直接应用
    fn write(&mut self, operation: Operation) {
        match &mut self.transaction {
            Some(tx) => {
                tx.track(&operation);
                tx.log.push(operation);
            }
            None => self.apply(operation),
        }
    }

    fn apply(&mut self, operation: Operation) {
        match operation {
            Operation::Put { entity_type, entity } => self.entities.entry(entity_type).or_default().put(entity),
            Operation::Delete { entity_type, id } => {
                if let Some(collection) = self.entities.get_mut(&entity_type) {
                    collection.remove(&id);
                }
            }
            Operation::ValidationError(record) => self.validation_errors.push(record),
        }
    }
}

/// 内存存储
///
/// 克隆共享同一份数据，便于在管道持有存储后检查结果。
#[derive(Clone)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
    transactional: bool,
}

impl fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("transactional", &self.transactional)
            .field("in_transaction", &self.in_transaction())
            .finish()
    }
}

fn entity_id(entity: &Value) -> Option<String> {
    match entity.get(ID_FIELD)? {
        Value::String(id) => Some(id.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

impl InMemoryStore {
    /// 支持事务的内存存储
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            transactional: true,
        }
    }

    /// 不支持事务的内存存储，写入立即可见
    pub fn non_transactional() -> Self {
        Self {
            transactional: false,
            ..Self::new()
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.state.lock().transaction.is_some()
    }

    /// 已提交的实体，按写入顺序
    pub fn entities(&self, entity_type: &str) -> Vec<Value> {
        self.state
            .lock()
            .entities
            .get(entity_type)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn entity_count(&self, entity_type: &str) -> usize {
        self.state
            .lock()
            .entities
            .get(entity_type)
            .map(Collection::len)
            .unwrap_or(0)
    }

    /// 已提交的校验错误记录
    pub fn validation_errors(&self) -> Vec<ValidationErrorRecord> {
        self.state.lock().validation_errors.clone()
    }

    fn not_found(entity_type: &str, id: String) -> StoreError {
        StoreError::NotFound {
            entity_type: entity_type.to_string(),
            id,
        }
    }

    fn require_id(entity: &Value, entity_type: &str) -> StoreResult<String> {
        entity_id(entity).ok_or_else(|| Self::not_found(entity_type, "<missing>".to_string()))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DataStore for InMemoryStore {
    fn create(&mut self, mut entity: Value, entity_type: &str, _context: &Context) -> StoreResult<Value> {
        if entity_id(&entity).is_none() {
            if let Some(map) = entity.as_object_mut() {
                map.insert(ID_FIELD.to_string(), Value::String(Uuid::new_v4().to_string()));
            }
        }

        let mut state = self.state.lock();
        if let Some(id) = entity_id(&entity) {
            if state.exists(entity_type, &id) {
                return Err(StoreError::Conflict {
                    entity_type: entity_type.to_string(),
                    id,
                });
            }
        }

        state.write(Operation::Put {
            entity_type: entity_type.to_string(),
            entity: entity.clone(),
        });
        debug!(entity_type, "实体已写入");
        Ok(entity)
    }

    fn update(&mut self, entity: Value, entity_type: &str, _context: &Context) -> StoreResult<Value> {
        let id = Self::require_id(&entity, entity_type)?;
        let mut state = self.state.lock();
        if !state.exists(entity_type, &id) {
            return Err(Self::not_found(entity_type, id));
        }
        state.write(Operation::Put {
            entity_type: entity_type.to_string(),
            entity: entity.clone(),
        });
        Ok(entity)
    }

    fn upsert(&mut self, entity: Value, entity_type: &str, context: &Context) -> StoreResult<Value> {
        if entity_id(&entity).is_none() {
            return self.create(entity, entity_type, context);
        }
        self.state.lock().write(Operation::Put {
            entity_type: entity_type.to_string(),
            entity: entity.clone(),
        });
        Ok(entity)
    }

    fn delete(&mut self, entity: &Value, entity_type: &str, _context: &Context) -> StoreResult<()> {
        let id = Self::require_id(entity, entity_type)?;
        let mut state = self.state.lock();
        if !state.exists(entity_type, &id) {
            return Err(Self::not_found(entity_type, id));
        }
        state.write(Operation::Delete {
            entity_type: entity_type.to_string(),
            id,
        });
        Ok(())
    }

    fn create_validation_error(
        &mut self,
        record: &ValidationErrorRecord,
        _context: &Context,
    ) -> StoreResult<()> {
        self.state
            .lock()
            .write(Operation::ValidationError(record.clone()));
        Ok(())
    }

    fn supports_transactions(&self) -> bool {
        self.transactional
    }

    fn begin_transaction(&mut self) -> StoreResult<()> {
        if !self.transactional {
            return Ok(());
        }
        let mut state = self.state.lock();
        if state.transaction.is_some() {
            return Err(StoreError::TransactionAlreadyActive);
        }
        state.transaction = Some(Transaction::default());
        Ok(())
    }

    fn commit(&mut self) -> StoreResult<()> {
        if !self.transactional {
            return Ok(());
        }
        let mut state = self.state.lock();
        let transaction = state.transaction.take().ok_or(StoreError::NoActiveTransaction)?;
        debug!(operations = transaction.log.len(), "提交事务");
        for operation in transaction.log {
            state.apply(operation);
        }
        Ok(())
    }

    fn rollback(&mut self, force: bool) -> StoreResult<()> {
        if !self.transactional {
            return Ok(());
        }
        let mut state = self.state.lock();
        if state.transaction.take().is_none() && !force {
            return Err(StoreError::NoActiveTransaction);
        }
        Ok(())
    }
}

type StoreConstructor = Arc<dyn Fn() -> Box<dyn DataStore> + Send + Sync>;

/// 数据存储注册表
#[derive(Clone)]
pub struct DataStoreFactory {
    constructors: HashMap<String, StoreConstructor>,
}

impl fmt::Debug for DataStoreFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.constructors.keys().collect();
        names.sort();
        f.debug_struct("DataStoreFactory").field("stores", &names).finish()
    }
}

impl DataStoreFactory {
    /// 预注册 memory 存储（每次创建独立实例）
    pub fn new() -> Self {
        let mut factory = Self::empty();
        factory.register(MEMORY_STORE, || Box::new(InMemoryStore::new()));
        factory
    }

    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn() -> Box<dyn DataStore> + Send + Sync + 'static,
    {
        self.constructors.insert(name.into(), Arc::new(constructor));
    }

    /// 注册共享的内存存储实例
    pub fn register_memory(&mut self, name: impl Into<String>, store: InMemoryStore) {
        self.register(name, move || Box::new(store.clone()));
    }

    pub fn create(&self, name: &str) -> crate::error::Result<Box<dyn DataStore>> {
        let constructor =
            self.constructors
                .get(name)
                .ok_or_else(|| crate::error::PipelineError::UnknownComponent {
                    kind: "数据存储",
                    name: name.to_string(),
                })?;
        Ok(constructor())
    }
}

impl Default for DataStoreFactory {
    fn default() -> Self {
        Self::new()
    }
}
