//! 错误类型定义
//!
//! `ApiError` 描述与 Clash API 通信时的失败（传输错误、超时、异常状态码），
//! `CheckError` 描述整次检测在策略组层面的失败。

use thiserror::Error;

/// Clash API 请求错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// 连接被拒绝、DNS 解析失败、TLS 错误等
    #[error("请求错误: {0}")]
    Transport(String),

    /// 请求超时，或 Clash 报告节点测速超时
    #[error("请求超时")]
    Timeout,

    #[error("认证失败，请检查 API Secret 是否正确")]
    Unauthorized,

    /// 非预期的 HTTP 状态码，保留 Clash 返回的 message
    #[error("HTTP 错误 {status}: {message}")]
    Status { status: u16, message: String },

    #[error("响应解析失败: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

/// 检测流程错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CheckError {
    /// 请求的策略组不在当前列表中，只影响该组
    #[error("策略组不存在: {0}")]
    UnknownGroup(String),

    /// 无法从 Clash API 获取节点列表，整次检测中止
    #[error("Clash API 不可用: {0}")]
    UpstreamUnavailable(#[source] ApiError),
}

impl CheckError {
    /// 是否需要中止整次检测
    pub fn is_fatal(&self) -> bool {
        matches!(self, CheckError::UpstreamUnavailable(_))
    }
}
