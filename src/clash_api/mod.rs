//! Clash API 模块封装
//! 对外提供节点列表获取和延迟测试接口

mod client;
mod types;

pub use client::{ClashApi, ProxyApi};
pub use types::{GLOBAL_GROUP, Node, NodeHealth, PolicyGroup, ProxyListing};
