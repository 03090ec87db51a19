//! Clash 配置文件重写
//! 检测完成后从配置中移除失效节点，并按延迟重排策略组

use crate::check::{GroupResult, TestReport};
use anyhow::{Result, anyhow};
use log::{info, warn};
use serde_yaml::Value;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// 重写结果
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ApplySummary {
    /// 从 proxies 中移除的节点
    pub removed: Vec<String>,
    /// 重新排序的策略组
    pub reordered: Vec<String>,
}

/// Clash 配置文件
#[derive(Debug, Clone)]
pub struct ClashProfile {
    path: PathBuf,
    config: Value,
}

fn name_of(value: &Value) -> Option<&str> {
    value.get("name").and_then(Value::as_str)
}

impl ClashProfile {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(anyhow!("找不到配置文件: {}", path.display()));
        }

        let content = fs::read_to_string(&path)?;
        let config: Value =
            serde_yaml::from_str(&content).map_err(|e| anyhow!("配置文件格式错误: {}", e))?;

        Ok(Self { path, config })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 获取所有策略组名称
    pub fn group_names(&self) -> Vec<String> {
        match self.config.get("proxy-groups") {
            Some(Value::Sequence(groups)) => groups
                .iter()
                .filter_map(name_of)
                .map(str::to_string)
                .collect(),
            _ => vec![],
        }
    }

    /// 获取指定组的所有成员
    #[cfg(test)]
    fn group_proxies(&self, group_name: &str) -> Vec<String> {
        let Some(Value::Sequence(groups)) = self.config.get("proxy-groups") else {
            return vec![];
        };

        groups
            .iter()
            .find(|g| name_of(g) == Some(group_name))
            .and_then(|g| g.get("proxies"))
            .and_then(Value::as_sequence)
            .map(|members| {
                members
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// 根据检测报告更新配置
    ///
    /// 在任一策略组中失效且没有在任何组中可用的节点会从 proxies 和所有策略组中移除；
    /// 因截止时间放弃的节点没有测量结果，保留不动。
    /// 已测试的策略组按延迟重排，报告中没有的成员保持原顺序排在后面。
    pub fn apply(&mut self, report: &TestReport) -> ApplySummary {
        let tested: HashMap<&str, &GroupResult> =
            report.tested().map(|g| (g.group.as_str(), g)).collect();

        let known = self.group_names();
        for name in tested.keys().filter(|name| !known.iter().any(|k| k == *name)) {
            warn!("策略组 '{}' 不在配置文件中，跳过重排", name);
        }

        let valid: HashSet<&str> = tested.values().flat_map(|g| g.ranked_names()).collect();
        let invalid: HashSet<String> = tested
            .values()
            .flat_map(|g| g.pruned.iter())
            .filter(|r| !r.abandoned)
            .map(|r| r.node.name.as_str())
            .filter(|name| !valid.contains(name))
            .map(str::to_string)
            .collect();

        let mut summary = ApplySummary::default();

        if let Some(Value::Sequence(proxies)) = self.config.get_mut("proxies") {
            proxies.retain(|proxy| match name_of(proxy) {
                Some(name) if invalid.contains(name) => {
                    summary.removed.push(name.to_string());
                    false
                }
                _ => true,
            });
        }

        if let Some(Value::Sequence(groups)) = self.config.get_mut("proxy-groups") {
            for group in groups.iter_mut() {
                let name = name_of(group).map(str::to_string);
                let Some(Value::Sequence(members)) = group.get_mut("proxies") else {
                    continue;
                };

                members.retain(|m| m.as_str().is_none_or(|n| !invalid.contains(n)));

                if let Some(result) = name.as_deref().and_then(|n| tested.get(n)) {
                    *members = reorder(members, &result.ranked_names());
                    summary.reordered.extend(name);
                }
            }
        }

        if !summary.removed.is_empty() {
            info!("已从配置中移除 {} 个失效节点", summary.removed.len());
        }
        summary
    }

    pub fn save(&self) -> Result<()> {
        let content = serde_yaml::to_string(&self.config)?;
        fs::write(&self.path, content)?;
        info!("新配置已保存到: {}", self.path.display());
        Ok(())
    }
}

/// 已排序的成员在前，其余成员保持原顺序
fn reorder(members: &[Value], ranked: &[&str]) -> Vec<Value> {
    let present: HashSet<&str> = members.iter().filter_map(Value::as_str).collect();
    let ranked_set: HashSet<&str> = ranked.iter().copied().collect();

    let mut ordered: Vec<Value> = ranked
        .iter()
        .filter(|name| present.contains(*name))
        .map(|name| Value::String(name.to_string()))
        .collect();
    ordered.extend(
        members
            .iter()
            .filter(|m| m.as_str().is_none_or(|n| !ranked_set.contains(n)))
            .cloned(),
    );
    ordered
}
