//! 单个策略组的检测与排序

use super::{
    Claim, FlightGuard, GroupResult, LatencyCache, NodeProbe, NodeResult, ProbeOutcome, Stats,
};
use crate::clash_api::{Node, PolicyGroup};
use crate::ui::progress::ProgressTracker;
use log::{debug, info, warn};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::Instant;

/// 策略组检测器
///
/// `permits` 由所有策略组共享，限制同时进行的网络测试数量；
/// 缓存命中或等待其他策略组测试结果的节点不占用并发名额。
#[derive(Clone)]
pub struct GroupRunner {
    probe: NodeProbe,
    cache: LatencyCache,
    permits: Arc<Semaphore>,
    stats: Arc<Stats>,
    progress: ProgressTracker,
    deadline: Option<Instant>,
}

/// 在截止时间前等待 future，超时返回 None
async fn until_deadline<F: Future>(deadline: Option<Instant>, fut: F) -> Option<F::Output> {
    match deadline {
        Some(at) => tokio::time::timeout_at(at, fut).await.ok(),
        None => Some(fut.await),
    }
}

impl GroupRunner {
    pub fn new(
        probe: NodeProbe,
        cache: LatencyCache,
        permits: Arc<Semaphore>,
        stats: Arc<Stats>,
    ) -> Self {
        Self {
            probe,
            cache,
            permits,
            stats,
            progress: ProgressTracker::disabled(),
            deadline: None,
        }
    }

    /// 设置整次检测的截止时间
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_progress(mut self, progress: ProgressTracker) -> Self {
        self.progress = progress;
        self
    }

    /// 测试策略组内所有节点，返回排序后的结果
    pub async fn run(&self, group: &PolicyGroup) -> GroupResult {
        if group.is_empty() {
            info!("策略组 '{}' 中没有代理节点", group.name);
            return GroupResult {
                group: group.name.clone(),
                ..Default::default()
            };
        }

        info!("开始测试策略组 '{}' 的 {} 个节点", group.name, group.size());

        let mut tasks = Vec::with_capacity(group.size());
        for node in &group.nodes {
            let runner = self.clone();
            let node = node.clone();
            tasks.push(tokio::spawn(async move { runner.test_node(node).await }));
        }

        // 按原顺序收集，完成顺序不影响结果
        let mut ranked = Vec::new();
        let mut pruned = Vec::new();
        for (node, task) in group.nodes.iter().zip(tasks) {
            let result = match task.await {
                Ok(result) => result,
                Err(e) => NodeResult {
                    node: node.clone(),
                    outcome: ProbeOutcome::Failure(format!("测试任务异常: {}", e)),
                    cached: false,
                    abandoned: false,
                },
            };
            self.stats.record_outcome(&result.outcome);

            if result.outcome.is_success() {
                ranked.push(result);
            } else {
                pruned.push(result);
            }
        }

        // sort_by_key 是稳定排序，延迟相同时保持原顺序
        ranked.sort_by_key(|r| r.outcome.latency());

        info!(
            "策略组 '{}' 测试完成: 可用 {}，失效 {}",
            group.name,
            ranked.len(),
            pruned.len()
        );

        GroupResult {
            group: group.name.clone(),
            ranked,
            pruned,
        }
    }

    /// 测试单个节点，超过截止时间的记为放弃
    async fn test_node(&self, node: Node) -> NodeResult {
        match until_deadline(self.deadline, self.resolve(&node.name)).await {
            Some((outcome, cached)) => NodeResult {
                node,
                outcome,
                cached,
                abandoned: false,
            },
            None => {
                // 被放弃的测试没有真实结果，不写入缓存
                warn!("节点 {} 超过截止时间，放弃测试", node.name);
                self.progress.record(&ProbeOutcome::Timeout, false);
                NodeResult {
                    node,
                    outcome: ProbeOutcome::Timeout,
                    cached: false,
                    abandoned: true,
                }
            }
        }
    }

    /// 取得节点结果：缓存、等待进行中的测试，或自己发起测试
    async fn resolve(&self, node: &str) -> (ProbeOutcome, bool) {
        loop {
            if let Some(outcome) = self.cached(node) {
                return (outcome, true);
            }

            match self.cache.claim(node) {
                Claim::Leader(guard) => {
                    // 登记前其他策略组可能刚写入结果
                    if let Some(outcome) = self.cached(node) {
                        return (outcome, true);
                    }
                    return self.measure(node, guard).await;
                }
                Claim::Follower(flight) => {
                    if let Some(outcome) = flight.wait().await {
                        debug!("节点 {} 复用进行中的测试结果", node);
                        self.stats.increment_cache_hits();
                        self.progress.record(&outcome, true);
                        return (outcome, true);
                    }
                    debug!("节点 {} 的测试被放弃，重新登记", node);
                }
            }
        }
    }

    /// 占用并发名额发出测试，结果写入缓存并通知等待方
    async fn measure(&self, node: &str, guard: FlightGuard) -> (ProbeOutcome, bool) {
        let outcome = match self.permits.clone().acquire_owned().await {
            Ok(_permit) => {
                let outcome = self.probe.probe(node).await;
                self.cache.put(node, outcome.clone(), Instant::now());
                guard.complete(outcome.clone());
                outcome
            }
            Err(_) => ProbeOutcome::Failure("并发控制已关闭".to_string()),
        };

        self.progress.record(&outcome, false);
        (outcome, false)
    }

    fn cached(&self, node: &str) -> Option<ProbeOutcome> {
        let entry = self.cache.get(node)?;
        debug!("节点 {} 使用缓存结果", node);
        self.stats.increment_cache_hits();
        self.progress.record(&entry.outcome, true);
        Some(entry.outcome)
    }
}
