use crate::check::ProbeOutcome;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// 节点测试进度，克隆后共享同一组计数
#[derive(Clone)]
pub struct ProgressTracker {
    progress: Option<ProgressBar>,
    total_nodes: Arc<AtomicU64>,
    alive_nodes: Arc<AtomicU64>,
    failed_nodes: Arc<AtomicU64>,
    cached_nodes: Arc<AtomicU64>,
}

impl ProgressTracker {
    pub fn new(enabled: bool) -> Self {
        if !enabled {
            return Self::disabled();
        }

        let style = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");

        let progress = ProgressBar::new(0);
        progress.set_style(style);

        Self {
            progress: Some(progress),
            ..Self::disabled()
        }
    }

    /// 不显示进度条，只计数
    pub fn disabled() -> Self {
        Self {
            progress: None,
            total_nodes: Arc::new(AtomicU64::new(0)),
            alive_nodes: Arc::new(AtomicU64::new(0)),
            failed_nodes: Arc::new(AtomicU64::new(0)),
            cached_nodes: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn set_total_nodes(&self, total: u64) {
        self.total_nodes.store(total, Ordering::Relaxed);

        if let Some(pb) = &self.progress {
            pb.set_length(total);
            pb.set_position(0);
        }
    }

    pub fn record(&self, outcome: &ProbeOutcome, cached: bool) {
        if outcome.is_success() {
            self.alive_nodes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_nodes.fetch_add(1, Ordering::Relaxed);
        }
        if cached {
            self.cached_nodes.fetch_add(1, Ordering::Relaxed);
        }

        if let Some(pb) = &self.progress {
            pb.inc(1);
            let mark = match (outcome.is_success(), cached) {
                (true, false) => "✅",
                (false, false) => "❌",
                (_, true) => "♻️ 缓存",
            };
            pb.set_message(mark);
        }
    }

    pub fn finalize(&self) {
        if let Some(pb) = &self.progress {
            let total = self.total_nodes.load(Ordering::Relaxed);
            pb.set_position(total);
            pb.finish_with_message("检测完成");
        }
    }

    pub fn get_stats(&self) -> ProgressStats {
        ProgressStats {
            total: self.total_nodes.load(Ordering::Relaxed),
            alive: self.alive_nodes.load(Ordering::Relaxed),
            failed: self.failed_nodes.load(Ordering::Relaxed),
            cached: self.cached_nodes.load(Ordering::Relaxed),
        }
    }
}

/// 进度计数快照
pub struct ProgressStats {
    pub total: u64,
    pub alive: u64,
    pub failed: u64,
    pub cached: u64,
}

impl ProgressStats {
    pub fn checked(&self) -> u64 {
        self.alive + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_disabled_tracker_still_counts() {
        let tracker = ProgressTracker::disabled();

        tracker.set_total_nodes(3);
        tracker.record(&ProbeOutcome::Success(Duration::from_millis(20)), false);
        tracker.record(&ProbeOutcome::Timeout, false);
        tracker.record(&ProbeOutcome::Success(Duration::from_millis(20)), true);
        tracker.finalize();

        let stats = tracker.get_stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.checked(), 3);
        assert_eq!(stats.cached, 1);
        assert_eq!(stats.alive, 2);
        assert_eq!(stats.failed, 1);
    }
}
