//! 测试数据

pub mod fixtures;
pub mod generators;

pub use fixtures::*;
pub use generators::*;
