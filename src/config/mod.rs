use crate::check::{DEFAULT_TEST_URL, TestOptions, TestScope};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Clash API
    pub api_host: String,
    pub api_ports: Vec<u16>,
    pub secret: Option<String>,

    // 检测参数
    pub concurrent: usize,
    /// 单个节点超时（毫秒）
    pub timeout: u64,
    pub test_url: String,
    /// 为空时测试所有策略组
    pub groups: Vec<String>,
    /// 整次检测的截止时间（秒）
    pub deadline: Option<u64>,

    // 输出
    pub print_progress: bool,
    pub log_level: String,
    /// 检测后需要重写的 Clash 配置文件
    pub profile: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_host: "127.0.0.1".to_string(),
            api_ports: vec![9090, 9097],
            secret: None,
            concurrent: 100,
            timeout: 5000,
            test_url: DEFAULT_TEST_URL.to_string(),
            groups: vec![],
            deadline: None,
            print_progress: true,
            log_level: "info".to_string(),
            profile: None,
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// 文件存在时加载，否则使用默认配置
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        if path.as_ref().exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn get_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    pub fn test_options(&self) -> TestOptions {
        TestOptions {
            concurrency: self.concurrent.max(1),
            timeout: self.get_timeout_duration(),
            target_url: self.test_url.clone(),
            deadline: self.deadline.map(Duration::from_secs),
        }
    }

    pub fn scope(&self) -> TestScope {
        TestScope::from_names(self.groups.iter().cloned())
    }
}
