use anyhow::Result;
use chrono::Local;
use clap::Parser;
use clash_delay_check::clash_api::ClashApi;
use clash_delay_check::config::Config;
use clash_delay_check::profile::ClashProfile;
use clash_delay_check::ui::{ProgressTracker, print_report, report_to_json};
use clash_delay_check::{TestOrchestrator, TestScope};
use log::error;
use std::sync::Arc;

/// Clash 策略组节点延迟检测工具
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 配置文件路径
    #[arg(short = 'f', long, default_value = "config/config.yaml")]
    config: String,

    /// 要测试的策略组名称（默认: 测试所有组）
    #[arg(short = 'g', long, num_args = 1..)]
    groups: Vec<String>,

    /// 最大并发测试数量
    #[arg(short = 'n', long)]
    concurrent: Option<usize>,

    /// 单个节点超时时间（毫秒）
    #[arg(short = 't', long)]
    timeout: Option<u64>,

    /// Clash API 地址
    #[arg(long)]
    host: Option<String>,

    /// Clash API 端口列表
    #[arg(short = 'p', long, num_args = 1..)]
    ports: Vec<u16>,

    /// Clash API Secret
    #[arg(short = 's', long)]
    secret: Option<String>,

    /// 测试地址
    #[arg(long)]
    url: Option<String>,

    /// 整次检测的截止时间（秒）
    #[arg(long)]
    deadline: Option<u64>,

    /// 检测后重写的 Clash 配置文件
    #[arg(long)]
    profile: Option<String>,

    /// 以 JSON 格式输出报告
    #[arg(long)]
    json: bool,

    /// 是否显示进度条
    #[arg(long)]
    progress: Option<bool>,

    /// 日志级别
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    /// 命令行参数覆盖配置文件
    fn merge_into(self, config: &mut Config) {
        if !self.groups.is_empty() {
            config.groups = self.groups;
        }
        if let Some(concurrent) = self.concurrent {
            config.concurrent = concurrent;
        }
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }
        if let Some(host) = self.host {
            config.api_host = host;
        }
        if !self.ports.is_empty() {
            config.api_ports = self.ports;
        }
        if self.secret.is_some() {
            config.secret = self.secret;
        }
        if let Some(url) = self.url {
            config.test_url = url;
        }
        if self.deadline.is_some() {
            config.deadline = self.deadline;
        }
        if self.profile.is_some() {
            config.profile = self.profile;
        }
        if let Some(progress) = self.progress {
            config.print_progress = progress;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let json = args.json;

    let mut config = Config::load_or_default(&args.config)?;
    let config_path = args.config.clone();
    args.merge_into(&mut config);

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.log_level.as_str()),
    )
    .init();

    if !json {
        println!("Clash 节点测试和清理工具");
        println!("配置文件: {}", config_path);
        println!("API 地址: {} {:?}", config.api_host, config.api_ports);
        println!("并发数量: {}", config.concurrent);
        println!("超时时间: {}ms", config.timeout);
        println!("测试地址: {}", config.test_url);
        match config.scope() {
            TestScope::All => println!("将测试所有策略组"),
            TestScope::Named(names) => println!("将测试以下策略组: {}", names.join(", ")),
        }
    }

    let start_time = Local::now();

    let api = match ClashApi::connect(&config.api_host, &config.api_ports, config.secret.clone())
        .await
    {
        Ok(api) => api,
        Err(e) => {
            error!(
                "请确保 Clash 正在运行，并且 External Controller 已启用于以下端口之一: {:?}",
                config.api_ports
            );
            return Err(e.into());
        }
    };

    // JSON 输出时不显示进度条，避免混入标准输出
    let progress = ProgressTracker::new(config.print_progress && !json);
    let orchestrator = TestOrchestrator::new(Arc::new(api)).with_progress(progress.clone());

    let report = orchestrator
        .run(&config.scope(), &config.test_options())
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report_to_json(&report))?);
    } else {
        print_report(&report);
    }

    if let Some(path) = &config.profile {
        let mut profile = ClashProfile::load(path)?;
        let summary = profile.apply(&report);
        profile.save()?;
        if !json {
            println!(
                "\n{}: 已移除 {} 个失效节点，已更新 {} 个策略组的节点顺序",
                profile.path().display(),
                summary.removed.len(),
                summary.reordered.len()
            );
        }
    }

    if !json {
        let stats = orchestrator.stats();
        let counted = progress.get_stats();
        println!(
            "\n共 {} 个节点结果（{} 个来自缓存），实际测试 {} 次，成功率 {:.2}%",
            counted.checked(),
            counted.cached,
            stats.probes_issued(),
            stats.get_success_rate()
        );
        let total_time = Local::now() - start_time;
        println!(
            "总耗时: {:.2} 秒",
            total_time.num_milliseconds() as f64 / 1000.0
        );
    }

    Ok(())
}
