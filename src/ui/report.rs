//! 检测报告输出

use crate::check::{GroupResult, NodeResult, ProbeOutcome, TestReport};
use crate::error::CheckError;
use serde_json::{Value, json};

/// 摘要中显示的最快节点数量
const TOP_NODES: usize = 5;

fn describe_outcome(outcome: &ProbeOutcome) -> String {
    match outcome {
        ProbeOutcome::Success(latency) => format!("{}ms", latency.as_millis()),
        ProbeOutcome::Timeout => "超时".to_string(),
        ProbeOutcome::Failure(reason) => format!("失败 ({})", reason),
    }
}

/// 单个策略组的文字摘要
pub fn format_group_summary(result: &GroupResult) -> String {
    let mut lines = vec![
        format!("策略组 '{}' 测试结果:", result.group),
        format!("总节点数: {}", result.total()),
        format!("可用节点数: {}", result.ranked.len()),
        format!("失效节点数: {}", result.pruned.len()),
    ];

    if let Some(average) = result.average_latency() {
        lines.push(format!("平均延迟: {:.2}ms", average.as_secs_f64() * 1000.0));
        lines.push(String::new());
        lines.push(format!("延迟最低的前{}个节点:", TOP_NODES));
        for (i, node) in result.ranked.iter().take(TOP_NODES).enumerate() {
            lines.push(format!(
                "{}. {}: {}{}",
                i + 1,
                node.node.name,
                describe_outcome(&node.outcome),
                if node.cached { " (缓存)" } else { "" }
            ));
        }
    }

    if !result.pruned.is_empty() {
        lines.push(String::new());
        lines.push("失效节点:".to_string());
        for (i, node) in result.pruned.iter().enumerate() {
            lines.push(format!(
                "{}. {}: {}{}",
                i + 1,
                node.node.name,
                describe_outcome(&node.outcome),
                if node.abandoned { " (未完成)" } else { "" }
            ));
        }
    }

    lines.join("\n")
}

/// 按策略组逐个输出报告
pub fn print_report(report: &TestReport) {
    for group in &report.groups {
        println!("\n{:=<60}", "");
        match &group.result {
            Ok(result) => println!("{}", format_group_summary(result)),
            Err(CheckError::UnknownGroup(name)) => println!("⚠️  策略组 '{}' 不存在", name),
            Err(e) => println!("❌ 策略组 '{}': {}", group.name, e),
        }
    }

    let missing = report.missing();
    if !missing.is_empty() {
        println!("\n警告: 以下策略组不存在: {}", missing.join(", "));
    }
}

fn node_json(result: &NodeResult) -> Value {
    let (status, latency_ms, reason) = match &result.outcome {
        ProbeOutcome::Success(latency) => ("ok", Some(latency.as_millis() as u64), None),
        ProbeOutcome::Timeout => ("timeout", None, None),
        ProbeOutcome::Failure(reason) => ("failure", None, Some(reason.as_str())),
    };

    json!({
        "name": result.node.name,
        "type": result.node.kind,
        "status": status,
        "delay_ms": latency_ms,
        "reason": reason,
        "cached": result.cached,
        "abandoned": result.abandoned,
    })
}

/// 将报告转换为 JSON，每个策略组标记为 tested 或 not_found
pub fn report_to_json(report: &TestReport) -> Value {
    let groups: Vec<Value> = report
        .groups
        .iter()
        .map(|group| match &group.result {
            Ok(result) => json!({
                "name": group.name,
                "status": "tested",
                "ranked": result.ranked.iter().map(node_json).collect::<Vec<_>>(),
                "pruned": result.pruned.iter().map(node_json).collect::<Vec<_>>(),
            }),
            Err(e) => {
                let status = match e {
                    CheckError::UnknownGroup(_) => "not_found",
                    CheckError::UpstreamUnavailable(_) => "aborted",
                };
                json!({
                    "name": group.name,
                    "status": status,
                    "error": e.to_string(),
                })
            }
        })
        .collect();

    json!({
        "started_at": report.started_at.to_rfc3339(),
        "elapsed_ms": report.elapsed.as_millis() as u64,
        "groups": groups,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::GroupReport;
    use crate::clash_api::Node;
    use chrono::Local;
    use std::time::Duration;

    fn node(name: &str, outcome: ProbeOutcome, cached: bool) -> NodeResult {
        NodeResult {
            node: Node::new(name, "Trojan"),
            outcome,
            cached,
            abandoned: false,
        }
    }

    fn sample_report() -> TestReport {
        let auto = GroupResult {
            group: "Auto".to_string(),
            ranked: vec![
                node("C", ProbeOutcome::Success(Duration::from_millis(20)), false),
                node("A", ProbeOutcome::Success(Duration::from_millis(50)), true),
            ],
            pruned: vec![
                node("B", ProbeOutcome::Timeout, false),
                NodeResult {
                    abandoned: true,
                    ..node("D", ProbeOutcome::Timeout, false)
                },
            ],
        };

        TestReport {
            groups: vec![
                GroupReport {
                    name: "Auto".to_string(),
                    result: Ok(auto),
                },
                GroupReport {
                    name: "Ghost".to_string(),
                    result: Err(CheckError::UnknownGroup("Ghost".to_string())),
                },
            ],
            started_at: Local::now(),
            elapsed: Duration::from_millis(1234),
        }
    }

    #[test]
    fn test_group_summary() {
        let report = sample_report();
        let summary = format_group_summary(report.tested().next().unwrap());

        assert!(summary.contains("总节点数: 4"));
        assert!(summary.contains("可用节点数: 2"));
        assert!(summary.contains("失效节点数: 2"));
        assert!(summary.contains("平均延迟: 35.00ms"));
        assert!(summary.contains("1. C: 20ms"));
        assert!(summary.contains("2. A: 50ms (缓存)"));
        assert!(summary.contains("1. B: 超时"));
        assert!(!summary.contains("1. B: 超时 (未完成)"));
        assert!(summary.contains("2. D: 超时 (未完成)"));
    }

    #[test]
    fn test_json_distinguishes_tested_and_missing() {
        let value = report_to_json(&sample_report());
        let groups = value["groups"].as_array().unwrap();

        assert_eq!(groups[0]["status"], "tested");
        assert_eq!(groups[0]["ranked"][0]["name"], "C");
        assert_eq!(groups[0]["ranked"][0]["delay_ms"], 20);
        assert_eq!(groups[0]["pruned"][0]["status"], "timeout");
        assert_eq!(groups[0]["pruned"][0]["abandoned"], false);
        assert_eq!(groups[0]["pruned"][1]["abandoned"], true);
        assert_eq!(groups[1]["status"], "not_found");
        assert_eq!(value["elapsed_ms"], 1234);
    }
}
