//! 检测调度：选择策略组、并发运行并汇总报告

use super::{
    GroupResult, GroupRunner, LatencyCache, NodeProbe, NodeResult, ProbeOutcome, Stats, TestOptions,
    TestScope, unique_names,
};
use crate::clash_api::{PolicyGroup, ProxyApi};
use crate::error::CheckError;
use crate::ui::progress::ProgressTracker;
use chrono::{DateTime, Local};
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// 单个策略组在报告中的条目
#[derive(Debug, Clone)]
pub struct GroupReport {
    pub name: String,
    /// 策略组不存在时为 `CheckError::UnknownGroup`
    pub result: Result<GroupResult, CheckError>,
}

/// 一次检测的完整报告，策略组顺序与请求顺序一致
#[derive(Debug, Clone)]
pub struct TestReport {
    pub groups: Vec<GroupReport>,
    pub started_at: DateTime<Local>,
    pub elapsed: Duration,
}

impl TestReport {
    pub fn get(&self, name: &str) -> Option<&Result<GroupResult, CheckError>> {
        self.groups.iter().find(|g| g.name == name).map(|g| &g.result)
    }

    /// 已完成测试的策略组
    pub fn tested(&self) -> impl Iterator<Item = &GroupResult> {
        self.groups.iter().filter_map(|g| g.result.as_ref().ok())
    }

    /// 不存在的策略组名称
    pub fn missing(&self) -> Vec<&str> {
        self.groups
            .iter()
            .filter(|g| g.result.is_err())
            .map(|g| g.name.as_str())
            .collect()
    }
}

enum Pending {
    Running(PolicyGroup, JoinHandle<GroupResult>),
    Rejected(CheckError),
}

/// 检测调度器
///
/// 缓存和统计在多次运行之间保留，同一进程内重复检测会复用 60 秒内的结果。
pub struct TestOrchestrator {
    api: Arc<dyn ProxyApi>,
    cache: LatencyCache,
    stats: Arc<Stats>,
    progress: ProgressTracker,
}

impl TestOrchestrator {
    pub fn new(api: Arc<dyn ProxyApi>) -> Self {
        Self {
            api,
            cache: LatencyCache::new(),
            stats: Arc::new(Stats::new()),
            progress: ProgressTracker::disabled(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressTracker) -> Self {
        self.progress = progress;
        self
    }

    pub fn stats(&self) -> Arc<Stats> {
        self.stats.clone()
    }

    /// 测试所有策略组
    pub async fn run_all(&self, options: &TestOptions) -> Result<TestReport, CheckError> {
        self.run(&TestScope::All, options).await
    }

    /// 测试指定策略组，不存在的组单独报告
    pub async fn run_subset(
        &self,
        names: &[String],
        options: &TestOptions,
    ) -> Result<TestReport, CheckError> {
        self.run(&TestScope::Named(names.to_vec()), options).await
    }

    /// 获取节点列表后按范围检测
    ///
    /// 只有获取列表失败时返回错误，此时不会发出任何测试请求。
    pub async fn run(
        &self,
        scope: &TestScope,
        options: &TestOptions,
    ) -> Result<TestReport, CheckError> {
        let listing = self.api.list_proxies().await.map_err(|e| {
            error!("获取代理列表失败: {}", e);
            CheckError::UpstreamUnavailable(e)
        })?;

        let names = match scope {
            TestScope::All => listing.group_names(),
            // 重复的名称只测试一次
            TestScope::Named(names) => unique_names(names.iter().cloned()),
        };

        let targets = names
            .into_iter()
            .map(|name| {
                let group = listing
                    .group(&name)
                    .ok_or_else(|| CheckError::UnknownGroup(name.clone()));
                (name, group)
            })
            .collect();

        Ok(self.execute(targets, options).await)
    }

    /// 测试已获取的策略组
    pub async fn run_groups(&self, groups: Vec<PolicyGroup>, options: &TestOptions) -> TestReport {
        let targets = groups
            .into_iter()
            .map(|group| (group.name.clone(), Ok(group)))
            .collect();
        self.execute(targets, options).await
    }

    async fn execute(
        &self,
        targets: Vec<(String, Result<PolicyGroup, CheckError>)>,
        options: &TestOptions,
    ) -> TestReport {
        let started_at = Local::now();
        let started = Instant::now();

        let concurrency = options.concurrency.max(1);
        let probe = NodeProbe::new(
            self.api.clone(),
            options.target_url.clone(),
            options.timeout,
            self.stats.clone(),
        );
        let mut runner = GroupRunner::new(
            probe,
            self.cache.clone(),
            Arc::new(Semaphore::new(concurrency)),
            self.stats.clone(),
        )
        .with_progress(self.progress.clone());
        // 截止时间过大无法表示时视为不限制
        if let Some(deadline) = options.deadline.and_then(|d| started.checked_add(d)) {
            runner = runner.with_deadline(deadline);
        }

        let total: usize = targets
            .iter()
            .filter_map(|(_, t)| t.as_ref().ok())
            .map(PolicyGroup::size)
            .sum();
        self.progress.set_total_nodes(total as u64);
        info!(
            "开始测试 {} 个策略组，共 {} 个节点 (最大并发: {})",
            targets.len(),
            total,
            concurrency
        );

        let mut pending = Vec::with_capacity(targets.len());
        for (name, target) in targets {
            match target {
                Ok(group) => {
                    let runner = runner.clone();
                    let task_group = group.clone();
                    let handle = tokio::spawn(async move { runner.run(&task_group).await });
                    pending.push((name, Pending::Running(group, handle)));
                }
                Err(e) => {
                    warn!("{}", e);
                    pending.push((name, Pending::Rejected(e)));
                }
            }
        }

        let mut groups = Vec::with_capacity(pending.len());
        for (name, task) in pending {
            let result = match task {
                Pending::Running(group, handle) => match handle.await {
                    Ok(result) => Ok(result),
                    Err(e) => {
                        error!("策略组 '{}' 测试任务异常: {}", name, e);
                        Ok(failed_group(&group, &format!("测试任务异常: {}", e)))
                    }
                },
                Pending::Rejected(e) => Err(e),
            };
            groups.push(GroupReport { name, result });
        }

        self.progress.finalize();

        let elapsed = started.elapsed();
        info!(
            "检测完成，实际测试 {} 次，缓存命中 {} 次，耗时 {:.2} 秒",
            self.stats.probes_issued(),
            self.stats.cache_hits(),
            elapsed.as_secs_f64()
        );

        TestReport {
            groups,
            started_at,
            elapsed,
        }
    }
}

fn failed_group(group: &PolicyGroup, reason: &str) -> GroupResult {
    GroupResult {
        group: group.name.clone(),
        ranked: Vec::new(),
        pruned: group
            .nodes
            .iter()
            .map(|node| NodeResult {
                node: node.clone(),
                outcome: ProbeOutcome::Failure(reason.to_string()),
                cached: false,
                abandoned: false,
            })
            .collect(),
    }
}
