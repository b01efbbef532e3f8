//! 通用 HTTP 响应处理
//!
//! Firestore 与 GitHub 客户端共用同一套失败分类：
//! 传输失败 / 未找到 / 空响应 / 格式错误。

use crate::suite::error::{Result, SyncError};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, error};

/// 按状态码和 body 对响应分类，成功时反序列化为 `T`
///
/// 与网络无关，便于单独测试。
pub fn parse_http_body<T: DeserializeOwned>(
    status: StatusCode,
    body: &[u8],
    operation_name: &str,
) -> Result<T> {
    let body_str = String::from_utf8_lossy(body);

    if status == StatusCode::NOT_FOUND {
        error!("[HTTP] {}目标不存在，响应: {}", operation_name, body_str);
        return Err(SyncError::NotFound(format!(
            "{}: HTTP {}",
            operation_name, status
        )));
    }

    if !status.is_success() {
        error!(
            "[HTTP] {}请求失败，HTTP状态: {}, 响应: {}",
            operation_name, status, body_str
        );
        return Err(SyncError::Transport(format!(
            "{}: HTTP {}: {}",
            operation_name, status, body_str
        )));
    }

    if body.iter().all(|b| b.is_ascii_whitespace()) {
        error!("[HTTP] {}未返回任何数据", operation_name);
        return Err(SyncError::EmptyResponse(operation_name.to_string()));
    }
    debug!("[HTTP] {}请求成功，HTTP状态: {}", operation_name, status);

    serde_json::from_slice(body).map_err(|e| {
        error!(
            "[HTTP] {}反序列化失败: {:?}\n原始响应: {}",
            operation_name, e, body_str
        );
        SyncError::MalformedResponse(format!("{}: {}", operation_name, e))
    })
}

/// 读取完整响应并交给 [`parse_http_body`] 分类
pub async fn handle_http_response<T: DeserializeOwned>(
    response: reqwest::Response,
    operation_name: &str,
) -> Result<T> {
    let status = response.status();
    // body 只能读取一次
    let body_bytes = response.bytes().await?;
    debug!(
        "[HTTP] {}响应 Body: {}",
        operation_name,
        String::from_utf8_lossy(&body_bytes)
    );
    parse_http_body(status, &body_bytes, operation_name)
}
