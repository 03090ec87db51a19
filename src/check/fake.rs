//! 测试用的 Clash API 替身，按节点预设测试结果

use crate::clash_api::{ProxyApi, ProxyListing};
use crate::error::ApiError;
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// 节点的预设行为
#[derive(Debug, Clone)]
pub(crate) enum Scripted {
    /// 等待指定时间后返回该延迟
    Delay(Duration),
    /// 永不返回
    Hang,
    Error(ApiError),
}

#[derive(Default)]
pub(crate) struct FakeApi {
    scripts: HashMap<String, Scripted>,
    groups: Vec<(String, Vec<String>)>,
    list_error: Option<ApiError>,
    delay_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls_per_node: Mutex<HashMap<String, usize>>,
}

/// 记录同时进行中的请求数，请求被取消时也会释放
struct RequestGuard<'a>(&'a AtomicUsize);

impl Drop for RequestGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeApi {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn node(mut self, name: &str, script: Scripted) -> Self {
        self.scripts.insert(name.to_string(), script);
        self
    }

    pub(crate) fn group(mut self, name: &str, members: &[&str]) -> Self {
        self.groups.push((
            name.to_string(),
            members.iter().map(|m| m.to_string()).collect(),
        ));
        self
    }

    pub(crate) fn failing_listing(mut self, error: ApiError) -> Self {
        self.list_error = Some(error);
        self
    }

    pub(crate) fn delay_calls(&self) -> usize {
        self.delay_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn calls_for(&self, node: &str) -> usize {
        self.calls_per_node
            .lock()
            .unwrap()
            .get(node)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl ProxyApi for FakeApi {
    async fn version(&self) -> Result<String, ApiError> {
        Ok("fake".to_string())
    }

    async fn list_proxies(&self) -> Result<ProxyListing, ApiError> {
        if let Some(err) = &self.list_error {
            return Err(err.clone());
        }

        let mut proxies = Map::new();
        for (name, members) in &self.groups {
            proxies.insert(name.clone(), json!({"type": "Selector", "all": members}));
        }
        for (_, members) in &self.groups {
            for member in members {
                if !proxies.contains_key(member) {
                    proxies.insert(member.clone(), json!({"type": "Shadowsocks"}));
                }
            }
        }

        ProxyListing::from_json(json!({ "proxies": Value::Object(proxies) }))
    }

    async fn delay(
        &self,
        node: &str,
        _target_url: &str,
        _timeout: Duration,
    ) -> Result<Duration, ApiError> {
        self.delay_calls.fetch_add(1, Ordering::SeqCst);
        *self
            .calls_per_node
            .lock()
            .unwrap()
            .entry(node.to_string())
            .or_insert(0) += 1;

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = RequestGuard(&self.in_flight);

        match self.scripts.get(node).cloned() {
            Some(Scripted::Delay(latency)) => {
                tokio::time::sleep(latency).await;
                Ok(latency)
            }
            Some(Scripted::Hang) => std::future::pending().await,
            Some(Scripted::Error(err)) => Err(err),
            None => Err(ApiError::Status {
                status: 404,
                message: "resource not found".to_string(),
            }),
        }
    }
}
