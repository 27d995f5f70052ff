//! recordflow 端到端测试
//!
//! 测试覆盖完整的处理流程，包括：
//! - 订单导入（过滤、转换、校验、持久化）
//! - 快速失败与错误收集两种批处理策略
//! - 共享规则的引用复用
//! - 组合管道的串行与嵌套路由
//! - 命令行入口

pub mod data;
pub mod helpers;
pub mod setup;
pub mod suites;

pub use setup::TestEnvironment;
