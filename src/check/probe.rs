//! 单节点延迟测试

use super::{ProbeOutcome, Stats};
use crate::clash_api::ProxyApi;
use crate::error::ApiError;
use log::debug;
use std::sync::Arc;
use std::time::Duration;

/// 通过 Clash API 测试单个节点的延迟
///
/// 每次调用只发出一次请求，不做重试。
#[derive(Clone)]
pub struct NodeProbe {
    api: Arc<dyn ProxyApi>,
    target_url: String,
    timeout: Duration,
    stats: Arc<Stats>,
}

impl NodeProbe {
    pub fn new(
        api: Arc<dyn ProxyApi>,
        target_url: impl Into<String>,
        timeout: Duration,
        stats: Arc<Stats>,
    ) -> Self {
        Self {
            api,
            target_url: target_url.into(),
            timeout,
            stats,
        }
    }

    /// 测试节点延迟，超过超时时间记为 Timeout
    pub async fn probe(&self, node: &str) -> ProbeOutcome {
        self.stats.increment_probes();

        let request = self.api.delay(node, &self.target_url, self.timeout);
        let outcome = match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(latency)) => ProbeOutcome::Success(latency),
            Ok(Err(ApiError::Timeout)) | Err(_) => ProbeOutcome::Timeout,
            Ok(Err(e)) => ProbeOutcome::Failure(e.to_string()),
        };

        debug!("节点 {} 测试结果: {:?}", node, outcome);
        outcome
    }
}
