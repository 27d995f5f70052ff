//! 测试辅助

pub mod assertions;
