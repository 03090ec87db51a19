//! 终端输出：进度条和检测报告

pub mod progress;
pub mod report;

pub use progress::ProgressTracker;
pub use report::{format_group_summary, print_report, report_to_json};
