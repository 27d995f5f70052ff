//! 记录处理管道
//!
//! 读取原始记录 → 准入过滤 → 映射为实体 → 规则后处理 → 在事务中持久化。
//! 组合管道可以把一条记录拆分后路由到多个子管道。

pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod factory;
pub mod mapping;
pub mod pipeline;
pub mod response;
pub mod source;
pub mod store;

pub use config::{PipelineConfig, PipelineEnv, PipelineSettings, RouteConfig};
pub use context::Context;
pub use error::{PipelineError, Result, StoreError};
pub use factory::PipelineFactory;
pub use mapping::{Entity, JsonMapping, MappedResponse, MapperFactory, Mapping};
pub use pipeline::{
    CompositePipeline, EntityPipeline, ExecutablePipeline, PersistencePipeline, Pipeline, PipelineInfo,
    TransformerPipeline,
};
pub use response::{ReadResponse, RecordResponse};
pub use source::{InputReader, JsonLinesReader, ReadCursor, SourceMap, VecReader};
pub use store::{DataStore, DataStoreFactory, InMemoryStore, StoreResult, ValidationErrorRecord};
