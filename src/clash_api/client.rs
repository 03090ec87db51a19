//! Clash External Controller API 客户端
//! 提供节点列表获取和单节点延迟测试

use super::types::ProxyListing;
use crate::error::{ApiError, CheckError};
use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

/// 普通请求（列表、版本）的超时时间
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// 延迟测试请求在 Clash 端超时之外额外等待的时间
const DELAY_REQUEST_SLACK: Duration = Duration::from_secs(1);

/// 检测引擎依赖的代理管理 API
#[async_trait]
pub trait ProxyApi: Send + Sync {
    /// 获取 Clash 版本，用于连接检查
    async fn version(&self) -> Result<String, ApiError>;

    /// 获取所有代理节点和策略组
    async fn list_proxies(&self) -> Result<ProxyListing, ApiError>;

    /// 通过 Clash 测试指定节点到目标地址的延迟
    async fn delay(
        &self,
        node: &str,
        target_url: &str,
        timeout: Duration,
    ) -> Result<Duration, ApiError>;
}

#[derive(Debug, Deserialize)]
struct VersionResponse {
    #[serde(default)]
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DelayResponse {
    delay: u64,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    message: String,
}

/// 基于 reqwest 的 Clash API 客户端
#[derive(Debug, Clone)]
pub struct ClashApi {
    client: Client,
    base_url: Url,
    secret: Option<String>,
}

impl ClashApi {
    /// 创建客户端
    ///
    /// # 参数
    /// - base_url: External Controller 地址，如 `http://127.0.0.1:9090`
    /// - secret: API Secret，为空时不发送认证头
    pub fn new(base_url: &str, secret: Option<String>) -> Result<Self, ApiError> {
        let base_url =
            Url::parse(base_url).map_err(|e| ApiError::Transport(format!("无效的 API 地址: {}", e)))?;
        // External Controller 直连，不走系统代理
        let client = Client::builder()
            .no_proxy()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ApiError::Transport(format!("创建 HTTP 客户端失败: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            secret: secret.filter(|s| !s.is_empty()),
        })
    }

    /// 依次尝试各端口，返回第一个可连接的客户端
    pub async fn connect(
        host: &str,
        ports: &[u16],
        secret: Option<String>,
    ) -> Result<Self, CheckError> {
        let mut last_error = ApiError::Transport("未指定 API 端口".to_string());

        for &port in ports {
            let api = ClashApi::new(&format!("http://{}:{}", host, port), secret.clone())
                .map_err(CheckError::UpstreamUnavailable)?;

            match api.version().await {
                Ok(version) => {
                    info!("成功连接到 Clash API (端口 {})，版本: {}", port, version);
                    return Ok(api);
                }
                Err(ApiError::Unauthorized) => {
                    return Err(CheckError::UpstreamUnavailable(ApiError::Unauthorized));
                }
                Err(e) => {
                    warn!("端口 {} 连接失败: {}，尝试下一个端口...", port, e);
                    last_error = e;
                }
            }
        }

        Err(CheckError::UpstreamUnavailable(last_error))
    }

    /// 拼接路径，每段单独做百分号编码
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ApiError::Transport(format!("无效的 API 地址: {}", self.base_url)))?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    fn delay_url(&self, node: &str, target_url: &str, timeout: Duration) -> Result<Url, ApiError> {
        let mut url = self.endpoint(&["proxies", node, "delay"])?;
        url.query_pairs_mut()
            .append_pair("url", target_url)
            .append_pair("timeout", &timeout.as_millis().to_string());
        Ok(url)
    }

    fn get(&self, url: Url) -> RequestBuilder {
        let request = self.client.get(url);
        match &self.secret {
            Some(secret) => request.bearer_auth(secret),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status.as_u16(), &body))
    }
}

/// 延迟测试请求本身的超时，比 Clash 端的超时稍长
fn delay_request_timeout(timeout: Duration) -> Duration {
    timeout.saturating_add(DELAY_REQUEST_SLACK)
}

/// 将非 2xx 响应映射为错误，保留 Clash 返回的 message
fn classify_status(status: u16, body: &str) -> ApiError {
    match status {
        401 => ApiError::Unauthorized,
        408 | 504 => ApiError::Timeout,
        _ => {
            let message = serde_json::from_str::<MessageResponse>(body)
                .map(|m| m.message)
                .unwrap_or_else(|_| body.trim().to_string());
            ApiError::Status { status, message }
        }
    }
}

#[async_trait]
impl ProxyApi for ClashApi {
    async fn version(&self) -> Result<String, ApiError> {
        let url = self.endpoint(&["version"])?;
        let response: VersionResponse = self.send(self.get(url)).await?;
        Ok(response.version.unwrap_or_else(|| "unknown".to_string()))
    }

    async fn list_proxies(&self) -> Result<ProxyListing, ApiError> {
        let url = self.endpoint(&["proxies"])?;
        let body: serde_json::Value = self.send(self.get(url)).await?;
        let listing = ProxyListing::from_json(body)?;
        debug!("获取到 {} 个代理条目", listing.len());
        Ok(listing)
    }

    async fn delay(
        &self,
        node: &str,
        target_url: &str,
        timeout: Duration,
    ) -> Result<Duration, ApiError> {
        let url = self.delay_url(node, target_url, timeout)?;
        let request = self.get(url).timeout(delay_request_timeout(timeout));
        let response: DelayResponse = self.send(request).await?;
        Ok(Duration::from_millis(response.delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_url_encodes_node_name() {
        let api = ClashApi::new("http://127.0.0.1:9090", None).unwrap();
        let url = api
            .delay_url(
                "🇭🇰 香港/01",
                "http://www.gstatic.com/generate_204",
                Duration::from_secs(5),
            )
            .unwrap();

        let segments: Vec<_> = url.path_segments().unwrap().collect();
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0], "proxies");
        assert_eq!(segments[2], "delay");
        assert!(!segments[1].contains('/'));

        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            query,
            vec![
                ("url".to_string(), "http://www.gstatic.com/generate_204".to_string()),
                ("timeout".to_string(), "5000".to_string()),
            ]
        );
    }

    #[test]
    fn test_delay_request_timeout() {
        assert_eq!(
            delay_request_timeout(Duration::from_secs(5)),
            Duration::from_secs(6)
        );
        assert_eq!(delay_request_timeout(Duration::MAX), Duration::MAX);
    }

    #[test]
    fn test_endpoint_with_base_path() {
        let api = ClashApi::new("http://example.com/clash/", None).unwrap();
        let url = api.endpoint(&["proxies"]).unwrap();
        assert_eq!(url.as_str(), "http://example.com/clash/proxies");
    }

    #[test]
    fn test_empty_secret_is_ignored() {
        let api = ClashApi::new("http://127.0.0.1:9090", Some(String::new())).unwrap();
        assert!(api.secret.is_none());
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(401, ""), ApiError::Unauthorized);
        assert_eq!(classify_status(504, r#"{"message":"Timeout"}"#), ApiError::Timeout);
        assert_eq!(
            classify_status(503, r#"{"message":"An error occurred in the delay test"}"#),
            ApiError::Status {
                status: 503,
                message: "An error occurred in the delay test".to_string()
            }
        );
        assert_eq!(
            classify_status(404, "not found\n"),
            ApiError::Status {
                status: 404,
                message: "not found".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_connect_refused_is_upstream_unavailable() {
        // 绑定后立即释放，得到一个没有监听的端口
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = ClashApi::connect("127.0.0.1", &[port], None)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckError::UpstreamUnavailable(_)));
    }

    #[tokio::test]
    async fn test_connect_without_ports() {
        let err = ClashApi::connect("127.0.0.1", &[], None).await.unwrap_err();
        assert!(err.is_fatal());
    }
}
