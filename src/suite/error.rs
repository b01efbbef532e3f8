//! 统一错误类型
//!
//! 叶子级失败（单条消息、单个资料）在服务层被转换为“缺失”，
//! 只有外层调用失败才以 `SyncError` 的形式返回给调用方。

use thiserror::Error;

/// SDK 错误分类
#[derive(Debug, Error)]
pub enum SyncError {
    /// 网络或请求失败
    #[error("传输失败: {0}")]
    Transport(String),

    /// 请求成功但目标不存在
    #[error("未找到: {0}")]
    NotFound(String),

    /// 请求成功但没有返回任何数据
    #[error("响应为空: {0}")]
    EmptyResponse(String),

    /// 响应存在但无法解析成预期结构
    #[error("响应格式错误: {0}")]
    MalformedResponse(String),

    /// 本地存储无法创建或更新记录
    #[error("本地记录分配失败: {0}")]
    LocalAllocation(String),

    /// 调用参数不满足前置条件
    #[error("非法参数: {0}")]
    IllegalArgument(String),

    /// 消息文档已写入，但会话的消息列表更新失败
    #[error("消息 {message_id} 已写入但未关联到会话 {chat_id}: {source}")]
    OrphanedMessage {
        message_id: String,
        chat_id: String,
        #[source]
        source: Box<SyncError>,
    },
}

impl SyncError {
    /// 把 DAO 层的 anyhow 错误归类为本地存储失败
    pub fn local(err: anyhow::Error) -> Self {
        SyncError::LocalAllocation(format!("{:#}", err))
    }

    /// 是否为传输层失败
    pub fn is_transport(&self) -> bool {
        matches!(self, SyncError::Transport(_))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Transport(err.to_string())
    }
}

/// 本 crate 统一使用的 Result 别名
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_error_keeps_context_chain() {
        let err = anyhow::anyhow!("disk full").context("插入消息失败");
        let sync_err = SyncError::local(err);
        match sync_err {
            SyncError::LocalAllocation(msg) => {
                assert!(msg.contains("插入消息失败"));
                assert!(msg.contains("disk full"));
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn test_orphaned_message_exposes_source() {
        use std::error::Error as _;
        let err = SyncError::OrphanedMessage {
            message_id: "m1".to_string(),
            chat_id: "c1".to_string(),
            source: Box::new(SyncError::Transport("timeout".to_string())),
        };
        assert!(err.to_string().contains("m1"));
        let source = err.source().map(|s| s.to_string()).unwrap_or_default();
        assert!(source.contains("timeout"));
        assert!(!err.is_transport());
    }
}
