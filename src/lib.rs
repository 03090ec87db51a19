//! Clash 策略组节点延迟检测
//!
//! 通过 Clash External Controller API 并发测试各策略组节点的延迟，
//! 剔除失效节点，并按延迟对剩余节点排序。

pub mod check;
pub mod clash_api;
pub mod config;
pub mod error;
pub mod profile;
pub mod ui;

pub use check::{
    GroupResult, LatencyCache, ProbeOutcome, TestOptions, TestOrchestrator, TestReport, TestScope,
};
pub use clash_api::{ClashApi, ProxyApi};
pub use error::{ApiError, CheckError};
