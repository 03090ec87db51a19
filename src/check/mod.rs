//! 延迟检测引擎
//!
//! 按策略组并发测试节点延迟：所有策略组共享同一个并发上限和同一份延迟缓存，
//! 每个策略组独立汇总结果，成功节点按延迟排序，失败节点剔除。

mod cache;
mod group;
mod orchestrator;
mod probe;

#[cfg(test)]
pub(crate) mod fake;

pub use cache::{CacheEntry, Claim, DEFAULT_TTL, FlightGuard, InFlight, LatencyCache};
pub use group::GroupRunner;
pub use orchestrator::{GroupReport, TestOrchestrator, TestReport};
pub use probe::NodeProbe;

use crate::clash_api::Node;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// 默认测试地址
pub const DEFAULT_TEST_URL: &str = "http://www.gstatic.com/generate_204";

/// 单个节点的测试结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Success(Duration),
    Timeout,
    Failure(String),
}

impl ProbeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Success(_))
    }

    pub fn latency(&self) -> Option<Duration> {
        match self {
            ProbeOutcome::Success(latency) => Some(*latency),
            _ => None,
        }
    }
}

/// 检测范围
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestScope {
    /// 所有策略组，按 API 返回的顺序
    All,
    /// 指定策略组，按请求顺序
    Named(Vec<String>),
}

impl TestScope {
    /// 由名称列表构造，空列表表示全部；重复名称只保留第一次出现
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let unique = unique_names(names);
        if unique.is_empty() {
            TestScope::All
        } else {
            TestScope::Named(unique)
        }
    }
}

/// 去掉重复名称，保留第一次出现的位置
pub(crate) fn unique_names<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut unique: Vec<String> = Vec::new();
    for name in names {
        let name = name.into();
        if !unique.contains(&name) {
            unique.push(name);
        }
    }
    unique
}

/// 检测参数
#[derive(Debug, Clone)]
pub struct TestOptions {
    /// 全局并发上限，所有策略组共享
    pub concurrency: usize,
    /// 单个节点的超时时间
    pub timeout: Duration,
    pub target_url: String,
    /// 整次检测的截止时间，超过后未完成的节点记为超时
    pub deadline: Option<Duration>,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            concurrency: 100,
            timeout: Duration::from_secs(5),
            target_url: DEFAULT_TEST_URL.to_string(),
            deadline: None,
        }
    }
}

/// 节点及其本次测试结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeResult {
    pub node: Node,
    pub outcome: ProbeOutcome,
    /// 结果是否来自缓存
    pub cached: bool,
    /// 超过整次检测的截止时间而放弃，没有实际测量结果
    pub abandoned: bool,
}

/// 单个策略组的检测结果
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GroupResult {
    pub group: String,
    /// 成功节点，按延迟升序，延迟相同保持原顺序
    pub ranked: Vec<NodeResult>,
    /// 失败或超时的节点，保持原顺序
    pub pruned: Vec<NodeResult>,
}

impl GroupResult {
    pub fn total(&self) -> usize {
        self.ranked.len() + self.pruned.len()
    }

    pub fn ranked_names(&self) -> Vec<&str> {
        self.ranked.iter().map(|r| r.node.name.as_str()).collect()
    }

    pub fn pruned_names(&self) -> Vec<&str> {
        self.pruned.iter().map(|r| r.node.name.as_str()).collect()
    }

    /// 成功节点的平均延迟
    pub fn average_latency(&self) -> Option<Duration> {
        if self.ranked.is_empty() {
            return None;
        }
        let total: Duration = self.ranked.iter().filter_map(|r| r.outcome.latency()).sum();
        Some(total / self.ranked.len() as u32)
    }
}

/// 检测统计，在所有工作任务间共享
#[derive(Debug, Default)]
pub struct Stats {
    probes_issued: AtomicU64,
    cache_hits: AtomicU64,
    alive_nodes: AtomicU64,
    failed_nodes: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_probes(&self) {
        self.probes_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_outcome(&self, outcome: &ProbeOutcome) {
        if outcome.is_success() {
            self.alive_nodes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_nodes.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// 实际发出的网络测试次数
    pub fn probes_issued(&self) -> u64 {
        self.probes_issued.load(Ordering::Relaxed)
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn alive_nodes(&self) -> u64 {
        self.alive_nodes.load(Ordering::Relaxed)
    }

    pub fn failed_nodes(&self) -> u64 {
        self.failed_nodes.load(Ordering::Relaxed)
    }

    pub fn get_success_rate(&self) -> f64 {
        let alive = self.alive_nodes();
        let total = alive + self.failed_nodes();

        if total > 0 {
            (alive as f64 / total as f64) * 100.0
        } else {
            0.0
        }
    }
}
