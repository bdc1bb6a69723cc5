//! artidown: 并发制品下载引擎
//!
//! 按地址去重的下载管理器，支持坐标解析、包装地址改写和带退避的重试。

pub mod cli;
pub mod config;
pub mod core;
pub mod resolver;
pub mod transport;
pub mod ui;
pub mod utils;
