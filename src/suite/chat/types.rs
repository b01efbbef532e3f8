//! 聊天同步的文档解析与结果类型

use crate::suite::chat::models::LocalMessage;
use crate::suite::document::DocumentSnapshot;
use serde::Serialize;

/// 参与者字段名
pub const PARTICIPANTS_FIELD: &str = "participants";
/// 消息 ID 列表字段名
pub const MESSAGES_FIELD: &str = "messages";
/// 消息文档：发送者
pub const SENDER_FIELD: &str = "sender_uid";
/// 消息文档：正文
pub const BODY_FIELD: &str = "message";
/// 消息文档：服务端时间戳
pub const TIMESTAMP_FIELD: &str = "timestamp";
/// 用户资料文档：昵称
pub const DISPLAY_NAME_FIELD: &str = "displayName";

/// 解析后的会话文档
#[derive(Debug, Clone, PartialEq)]
pub struct ChatDocument {
    pub chat_id: String,
    /// 恰好两个参与者
    pub participants: [String; 2],
    pub message_ids: Vec<String>,
}

impl ChatDocument {
    /// 从快照解析；参与者不是两个字符串时返回跳过原因
    ///
    /// 消息列表缺失（或不是字符串数组）时视为空列表。
    pub fn parse(doc: &DocumentSnapshot) -> Result<Self, SkipReason> {
        let participants = doc
            .get_string_array(PARTICIPANTS_FIELD)
            .ok_or(SkipReason::MissingParticipants)?;
        let participants: [String; 2] = participants
            .try_into()
            .map_err(|p: Vec<String>| SkipReason::ParticipantCount { count: p.len() })?;
        let message_ids = doc.get_string_array(MESSAGES_FIELD).unwrap_or_default();

        Ok(Self {
            chat_id: doc.id.clone(),
            participants,
            message_ids,
        })
    }

    /// 对方用户 ID：当前用户在 0 号位时取 1 号位，否则取 0 号位
    pub fn counterpart_of(&self, user_id: &str) -> &str {
        if self.participants[0] == user_id {
            &self.participants[1]
        } else {
            &self.participants[0]
        }
    }
}

/// 会话文档被跳过的原因（不是错误）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SkipReason {
    /// 参与者字段缺失或不是字符串数组
    MissingParticipants,
    /// 参与者数量不是 2
    ParticipantCount { count: usize },
}

/// 单个会话在一次同步中的结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum ChatOutcome {
    /// 本地已存在，直接复用（不重新拉取消息和资料）
    Reused { chat_id: String },
    /// 新建并完成挂载
    Created {
        chat_id: String,
        requested: usize,
        attached: usize,
        failed_message_ids: Vec<String>,
    },
    /// 结构不满足前置条件，静默跳过
    Skipped {
        document_id: String,
        reason: SkipReason,
    },
    /// 处理失败（本地分配或资料获取失败），本次同步不挂载
    Dropped { chat_id: String, error: String },
}

impl ChatOutcome {
    /// 需要挂载到用户的会话 ID
    pub fn attached_chat_id(&self) -> Option<&str> {
        match self {
            ChatOutcome::Reused { chat_id } | ChatOutcome::Created { chat_id, .. } => {
                Some(chat_id)
            }
            ChatOutcome::Skipped { .. } | ChatOutcome::Dropped { .. } => None,
        }
    }
}

/// 单条消息的解析结果
#[derive(Debug, Clone, PartialEq)]
pub enum MessageOutcome {
    Resolved(LocalMessage),
    Failed { message_id: String, error: String },
}

impl MessageOutcome {
    /// 成功时返回消息，失败视为缺失
    pub fn into_message(self) -> Option<LocalMessage> {
        match self {
            MessageOutcome::Resolved(message) => Some(message),
            MessageOutcome::Failed { .. } => None,
        }
    }
}

/// 一次会话同步的报告
///
/// 同步是尽力而为的：`Skipped` 和 `Dropped` 都不会让调用失败，
/// 这里只是把它们显式列出来。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    #[serde(rename = "userID")]
    pub user_id: String,
    /// 按完成顺序排列
    pub outcomes: Vec<ChatOutcome>,
    /// 本次写入用户会话列表的会话 ID，按完成顺序
    pub attached_chat_ids: Vec<String>,
}

impl SyncReport {
    pub fn count_reused(&self) -> usize {
        self.count(|o| matches!(o, ChatOutcome::Reused { .. }))
    }

    pub fn count_created(&self) -> usize {
        self.count(|o| matches!(o, ChatOutcome::Created { .. }))
    }

    pub fn count_skipped(&self) -> usize {
        self.count(|o| matches!(o, ChatOutcome::Skipped { .. }))
    }

    pub fn count_dropped(&self) -> usize {
        self.count(|o| matches!(o, ChatOutcome::Dropped { .. }))
    }

    /// 查找某个会话的结果
    pub fn outcome_for(&self, id: &str) -> Option<&ChatOutcome> {
        self.outcomes.iter().find(|o| match o {
            ChatOutcome::Reused { chat_id }
            | ChatOutcome::Created { chat_id, .. }
            | ChatOutcome::Dropped { chat_id, .. } => chat_id == id,
            ChatOutcome::Skipped { document_id, .. } => document_id == id,
        })
    }

    fn count(&self, pred: impl Fn(&ChatOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(o)).count()
    }
}
