//! 测试套件

pub mod cli;
pub mod composite_routing;
pub mod order_import;
