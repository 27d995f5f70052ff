//! 共享库
//!
//! 包含配置加载和可观测性初始化等基础设施代码。

pub mod config;
pub mod observability;

pub use config::{AppConfig, PipelineRunConfig};
pub use observability::ObservabilityConfig;
