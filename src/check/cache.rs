//! 节点延迟缓存
//! 同一节点在有效期内不重复测试，过期条目在读取时判定

use super::ProbeOutcome;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// 缓存有效期
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// 单个节点的缓存条目
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub outcome: ProbeOutcome,
    pub measured_at: Instant,
}

impl CacheEntry {
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.measured_at.elapsed() < ttl
    }
}

/// 正在进行的测试，等待方通过它拿到发起方的结果
#[derive(Debug)]
pub struct InFlight(watch::Receiver<Option<ProbeOutcome>>);

impl InFlight {
    /// 等待测试结果；发起方放弃测试时返回 None
    pub async fn wait(mut self) -> Option<ProbeOutcome> {
        match self.0.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).clone(),
            Err(_) => None,
        }
    }
}

/// 测试发起方持有的登记，释放时从进行中列表移除
#[derive(Debug)]
pub struct FlightGuard {
    node: String,
    sender: watch::Sender<Option<ProbeOutcome>>,
    in_flight: Arc<DashMap<String, watch::Receiver<Option<ProbeOutcome>>>>,
}

impl FlightGuard {
    /// 通知所有等待方
    pub fn complete(self, outcome: ProbeOutcome) {
        self.sender.send_replace(Some(outcome));
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.node);
    }
}

/// 登记测试的结果
#[derive(Debug)]
pub enum Claim {
    /// 由调用方发起测试
    Leader(FlightGuard),
    /// 同一节点已有测试在进行
    Follower(InFlight),
}

/// 线程安全的延迟缓存，按节点名全局共享（不区分策略组）
///
/// 克隆得到的是同一份缓存的句柄。除已完成的结果外还记录正在进行的测试，
/// 同一节点同一时间只有一个测试请求。
#[derive(Debug, Clone)]
pub struct LatencyCache {
    entries: Arc<DashMap<String, CacheEntry>>,
    in_flight: Arc<DashMap<String, watch::Receiver<Option<ProbeOutcome>>>>,
    ttl: Duration,
}

impl Default for LatencyCache {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencyCache {
    /// 创建默认有效期（60 秒）的缓存
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            in_flight: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// 获取未过期的缓存条目
    pub fn get(&self, node: &str) -> Option<CacheEntry> {
        self.entries
            .get(node)
            .filter(|entry| entry.is_fresh(self.ttl))
            .map(|entry| entry.value().clone())
    }

    /// 写入测试结果，直接覆盖旧值
    pub fn put(&self, node: &str, outcome: ProbeOutcome, measured_at: Instant) {
        self.entries.insert(
            node.to_string(),
            CacheEntry {
                outcome,
                measured_at,
            },
        );
    }

    /// 登记对节点的测试
    ///
    /// 没有进行中的测试时调用方成为发起方，否则返回可等待的 `InFlight`。
    /// 分片锁只在登记期间持有，不跨越网络请求。
    pub fn claim(&self, node: &str) -> Claim {
        match self.in_flight.entry(node.to_string()) {
            Entry::Occupied(entry) => Claim::Follower(InFlight(entry.get().clone())),
            Entry::Vacant(entry) => {
                let (sender, receiver) = watch::channel(None);
                entry.insert(receiver);
                Claim::Leader(FlightGuard {
                    node: node.to_string(),
                    sender,
                    in_flight: self.in_flight.clone(),
                })
            }
        }
    }

    /// 条目数量（包含已过期的）
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
