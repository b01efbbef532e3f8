//! 聊天本地模型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 本地用户
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalUser {
    #[serde(rename = "userID")]
    pub user_id: String,
    #[serde(rename = "displayName")]
    pub display_name: Option<String>,
}

impl LocalUser {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: None,
        }
    }
}

/// 本地会话（双人聊天）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalChat {
    /// 远端文档 ID
    #[serde(rename = "chatID")]
    pub chat_id: String,
    /// 对方用户 ID
    #[serde(rename = "recipientID")]
    pub counterpart_id: String,
    /// 对方昵称（资料获取失败时为空）
    #[serde(rename = "recipientName")]
    pub counterpart_name: Option<String>,
    /// 已挂载的消息，按挂载顺序
    pub messages: Vec<LocalMessage>,
}

/// 本地消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalMessage {
    /// 本地记录 ID（自增）
    #[serde(rename = "localID")]
    pub local_id: i64,
    /// 远端文档 ID
    #[serde(rename = "messageID")]
    pub message_id: String,
    #[serde(rename = "senderID")]
    pub sender_id: Option<String>,
    pub body: Option<String>,
    /// 服务端时间戳，尚未提交时为空
    pub timestamp: Option<DateTime<Utc>>,
}

/// 发送者
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sender {
    pub id: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
}

impl Sender {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// 头像（只有首字母，没有图片）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Avatar {
    pub initials: String,
}

impl Avatar {
    /// 取名字第一个词和最后一个词的首字母，缺失时用 'A'
    pub fn from_display_name(display_name: &str) -> Self {
        let mut words = display_name.split_whitespace();
        let first = words.next().and_then(|w| w.chars().next());
        let last = words.last().and_then(|w| w.chars().next()).or(first);
        let initials: String = [first.unwrap_or('A'), last.unwrap_or('A')]
            .iter()
            .collect();
        Self { initials }
    }
}

/// 聊天同步器配置
#[derive(Debug, Clone)]
pub struct ChatSyncerConfig {
    /// 会话集合名
    pub chats_collection: String,
    /// 消息集合名
    pub messages_collection: String,
    /// 用户资料集合名
    pub users_collection: String,
    /// 写入队列容量
    pub writer_queue_size: usize,
}

impl Default for ChatSyncerConfig {
    fn default() -> Self {
        Self {
            chats_collection: "chats".to_string(),
            messages_collection: "messages".to_string(),
            users_collection: "users".to_string(),
            writer_queue_size: 256,
        }
    }
}
