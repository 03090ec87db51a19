//! Clash 代理节点与策略组结构体定义

use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Clash 内置的全局策略组，按 "全部" 范围检测时跳过
pub const GLOBAL_GROUP: &str = "GLOBAL";

/// 节点健康状态（取自 Clash 返回的 alive 字段）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeHealth {
    Unknown,
    Alive,
    Dead,
}

/// 代理节点信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    /// 节点名称，同时作为节点标识
    pub name: String,
    /// 类型（如：Shadowsocks, Vmess, Trojan, Selector, URLTest 等）
    pub kind: String,
    /// Clash 记录的上一次延迟
    pub last_delay: Option<Duration>,
    pub health: NodeHealth,
}

impl Node {
    /// 创建新的节点信息，延迟和健康状态未知
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            last_delay: None,
            health: NodeHealth::Unknown,
        }
    }

    /// 设置上一次延迟
    pub fn with_last_delay(mut self, delay: Duration) -> Self {
        self.last_delay = Some(delay);
        self
    }

    pub fn with_health(mut self, health: NodeHealth) -> Self {
        self.health = health;
        self
    }
}

/// 策略组，成员顺序与 Clash 返回的一致
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyGroup {
    pub name: String,
    pub kind: String,
    /// 当前选中的节点
    pub now: Option<String>,
    pub nodes: Vec<Node>,
}

impl PolicyGroup {
    pub fn new(name: impl Into<String>, nodes: Vec<Node>) -> Self {
        Self {
            name: name.into(),
            kind: "Selector".to_string(),
            now: None,
            nodes,
        }
    }

    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct DelayHistory {
    delay: u64,
}

/// `GET /proxies` 中的单个条目
#[derive(Debug, Deserialize)]
struct RawProxy {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    all: Option<Vec<String>>,
    #[serde(default)]
    now: Option<String>,
    #[serde(default)]
    history: Vec<DelayHistory>,
    #[serde(default)]
    alive: Option<bool>,
}

#[derive(Debug)]
struct ListingEntry {
    node: Node,
    members: Option<Vec<String>>,
    now: Option<String>,
}

/// `GET /proxies` 的解析结果，保持 API 返回的条目顺序
#[derive(Debug, Default)]
pub struct ProxyListing {
    entries: Vec<ListingEntry>,
}

impl ProxyListing {
    /// 从 `GET /proxies` 的响应体解析
    pub fn from_json(body: serde_json::Value) -> Result<Self, ApiError> {
        let proxies = match body.get("proxies") {
            Some(serde_json::Value::Object(map)) => map,
            _ => return Err(ApiError::Decode("响应中缺少 proxies 字段".to_string())),
        };

        let mut entries = Vec::with_capacity(proxies.len());
        for (name, value) in proxies {
            let raw: RawProxy = serde_json::from_value(value.clone())
                .map_err(|e| ApiError::Decode(format!("节点 {} 解析失败: {}", name, e)))?;

            // history 中 delay 为 0 表示该次测速失败
            let mut node = Node::new(name.clone(), raw.kind);
            if let Some(last) = raw.history.last() {
                if last.delay > 0 {
                    node = node.with_last_delay(Duration::from_millis(last.delay));
                }
            }
            node = node.with_health(match raw.alive {
                Some(true) => NodeHealth::Alive,
                Some(false) => NodeHealth::Dead,
                None => NodeHealth::Unknown,
            });

            entries.push(ListingEntry {
                node,
                members: raw.all,
                now: raw.now,
            });
        }

        Ok(Self { entries })
    }

    /// 所有策略组名称（跳过 GLOBAL）
    pub fn group_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.members.is_some() && e.node.name != GLOBAL_GROUP)
            .map(|e| e.node.name.clone())
            .collect()
    }

    /// 根据名称查找节点
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.entries.iter().find(|e| e.node.name == name).map(|e| &e.node)
    }

    /// 获取指定策略组，成员解析为节点信息
    ///
    /// 成员不在列表中时（例如来自 provider）仍保留，类型记为 unknown。
    pub fn group(&self, name: &str) -> Option<PolicyGroup> {
        let entry = self.entries.iter().find(|e| e.node.name == name)?;
        let members = entry.members.as_ref()?;

        let nodes = members
            .iter()
            .map(|member| {
                self.node(member)
                    .cloned()
                    .unwrap_or_else(|| Node::new(member.clone(), "unknown"))
            })
            .collect();

        Some(PolicyGroup {
            name: entry.node.name.clone(),
            kind: entry.node.kind.clone(),
            now: entry.now.clone(),
            nodes,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
