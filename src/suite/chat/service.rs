//! 聊天同步服务层
//!
//! 拉取用户参与的全部会话，对本地尚不存在的会话并发解析消息和对方资料，
//! 全部完成后把结果整体挂到用户的会话列表上。
//!
//! 同步是尽力而为的：单条消息、单个资料的失败只会让对应条目缺失，
//! 结果报告 [`SyncReport`] 中会逐条列出。

use crate::suite::chat::dao::ChatDao;
use crate::suite::chat::listener::{ChatListener, EmptyChatListener};
use crate::suite::chat::models::{Avatar, ChatSyncerConfig, LocalChat, LocalUser, Sender};
use crate::suite::chat::types::{
    ChatDocument, ChatOutcome, MessageOutcome, SyncReport, BODY_FIELD, DISPLAY_NAME_FIELD,
    MESSAGES_FIELD, PARTICIPANTS_FIELD, SENDER_FIELD, TIMESTAMP_FIELD,
};
use crate::suite::chat::writer::StoreWriter;
use crate::suite::document::{DocumentSnapshot, DocumentStore, WriteFields, WriteValue};
use crate::suite::error::{Result, SyncError};
use futures_util::stream::{FuturesUnordered, StreamExt};
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 聊天同步器
pub struct ChatSyncer {
    config: ChatSyncerConfig,
    /// 远端文档数据库
    documents: Arc<dyn DocumentStore>,
    /// 只读访问
    dao: ChatDao,
    /// 所有本地写入都经过它
    writer: StoreWriter,
    /// 聊天监听器
    listener: Arc<dyn ChatListener>,
}

impl ChatSyncer {
    /// 创建新的聊天同步器（默认配置，空监听器）
    ///
    /// `db` 的表结构需已初始化，见 [`crate::suite::db`]。
    pub fn new(documents: Arc<dyn DocumentStore>, db: Pool<Sqlite>) -> Self {
        Self::with_listener(
            ChatSyncerConfig::default(),
            documents,
            db,
            Arc::new(EmptyChatListener),
        )
    }

    /// 创建新的聊天同步器（带自定义监听器）
    pub fn with_listener(
        config: ChatSyncerConfig,
        documents: Arc<dyn DocumentStore>,
        db: Pool<Sqlite>,
        listener: Arc<dyn ChatListener>,
    ) -> Self {
        let dao = ChatDao::new(db);
        let writer = StoreWriter::spawn(dao.clone(), config.writer_queue_size);
        Self {
            config,
            documents,
            dao,
            writer,
            listener,
        }
    }

    /// 从本地获取用户的会话（含消息）
    pub async fn get_user_chats(&self, user_id: &str) -> Result<Vec<LocalChat>> {
        self.dao
            .get_user_chats(user_id)
            .await
            .map_err(SyncError::local)
    }

    /// 从本地按远端 ID 查找会话
    pub async fn find_chat(&self, chat_id: &str) -> Result<Option<LocalChat>> {
        self.dao.find_chat(chat_id).await.map_err(SyncError::local)
    }

    /// 同步用户参与的所有会话
    ///
    /// 返回时所有会话（含消息解析和资料获取）都已处理完毕，
    /// 用户的会话列表已被替换为本次成功挂载的会话。
    ///
    /// 会话查询失败时返回错误，本地数据不做任何修改。
    pub async fn fetch_chats(&self, user: &LocalUser) -> Result<SyncReport> {
        if user.user_id.is_empty() {
            return Err(SyncError::IllegalArgument("用户 ID 为空".to_string()));
        }
        info!("[ChatSync] 🔄 开始同步用户 {} 的会话...", user.user_id);
        self.listener.on_sync_start(user.user_id.clone()).await;

        let documents = match self
            .documents
            .query_array_contains(
                &self.config.chats_collection,
                PARTICIPANTS_FIELD,
                &user.user_id,
            )
            .await
        {
            Ok(documents) => documents,
            Err(e) => {
                error!("[ChatSync] 无法获取会话列表: {}", e);
                self.listener
                    .on_sync_failed(user.user_id.clone(), e.to_string())
                    .await;
                return Err(e);
            }
        };
        debug!("[ChatSync] 查询到 {} 个会话文档", documents.len());

        let report = match self.materialize_chats(user, &documents).await {
            Ok(report) => report,
            Err(e) => {
                error!("[ChatSync] 写入用户会话列表失败: {}", e);
                self.listener
                    .on_sync_failed(user.user_id.clone(), e.to_string())
                    .await;
                return Err(e);
            }
        };

        info!(
            "[ChatSync] ✅ 会话同步完成 - 新建: {}, 复用: {}, 跳过: {}, 丢弃: {}",
            report.count_created(),
            report.count_reused(),
            report.count_skipped(),
            report.count_dropped()
        );
        if let Ok(json) = serde_json::to_string(&report) {
            self.listener.on_sync_finish(json).await;
        }
        Ok(report)
    }

    /// 并发处理所有会话文档，全部完成后整体替换用户的会话列表
    async fn materialize_chats(
        &self,
        user: &LocalUser,
        documents: &[DocumentSnapshot],
    ) -> Result<SyncReport> {
        self.writer
            .upsert_user(user.clone())
            .await
            .map_err(SyncError::local)?;

        let mut report = SyncReport {
            user_id: user.user_id.clone(),
            ..Default::default()
        };

        let mut pending: FuturesUnordered<_> = documents
            .iter()
            .map(|doc| self.process_chat_document(&user.user_id, doc))
            .collect();
        while let Some(outcome) = pending.next().await {
            if let Some(chat_id) = outcome.attached_chat_id() {
                report.attached_chat_ids.push(chat_id.to_string());
            }
            report.outcomes.push(outcome);
        }
        drop(pending);

        self.writer
            .replace_user_chats(user.user_id.clone(), report.attached_chat_ids.clone())
            .await
            .map_err(SyncError::local)?;
        Ok(report)
    }

    /// 处理单个会话文档：跳过 / 复用 / 新建并解析
    async fn process_chat_document(&self, user_id: &str, doc: &DocumentSnapshot) -> ChatOutcome {
        let parsed = match ChatDocument::parse(doc) {
            Ok(parsed) => parsed,
            Err(reason) => {
                debug!("[ChatSync] 跳过会话文档 {}: {:?}", doc.id, reason);
                return ChatOutcome::Skipped {
                    document_id: doc.id.clone(),
                    reason,
                };
            }
        };

        let counterpart_id = parsed.counterpart_of(user_id).to_string();
        // 查找和新建在写任务内一次完成，并发同步不会重复创建
        let chat = match self
            .writer
            .find_or_create_chat(parsed.chat_id.clone(), counterpart_id.clone())
            .await
        {
            Ok((_, false)) => {
                // 已存在的会话不重新拉取消息和资料
                debug!("[ChatSync] 复用本地会话 {}", parsed.chat_id);
                return ChatOutcome::Reused {
                    chat_id: parsed.chat_id,
                };
            }
            Ok((chat, true)) => chat,
            Err(e) => {
                error!("[ChatSync] 无法创建会话记录 {}: {:#}", parsed.chat_id, e);
                return ChatOutcome::Dropped {
                    chat_id: parsed.chat_id,
                    error: SyncError::local(e).to_string(),
                };
            }
        };

        let (message_outcomes, profile) = tokio::join!(
            self.resolve_and_attach_messages(&chat.chat_id, &parsed.message_ids),
            self.apply_counterpart_profile(&chat.chat_id, &counterpart_id),
        );

        let failed_message_ids: Vec<String> = message_outcomes
            .iter()
            .filter_map(|o| match o {
                MessageOutcome::Failed { message_id, .. } => Some(message_id.clone()),
                MessageOutcome::Resolved(_) => None,
            })
            .collect();
        let attached = message_outcomes.len() - failed_message_ids.len();

        match profile {
            Ok(()) => {
                debug!(
                    "[ChatSync] 会话 {} 已就绪，消息 {}/{}",
                    chat.chat_id,
                    attached,
                    parsed.message_ids.len()
                );
                ChatOutcome::Created {
                    chat_id: chat.chat_id,
                    requested: parsed.message_ids.len(),
                    attached,
                    failed_message_ids,
                }
            }
            Err(e) => ChatOutcome::Dropped {
                chat_id: chat.chat_id,
                error: e.to_string(),
            },
        }
    }

    /// 并发解析所有消息，按完成顺序挂到会话上
    async fn resolve_and_attach_messages(
        &self,
        chat_id: &str,
        message_ids: &[String],
    ) -> Vec<MessageOutcome> {
        let mut outcomes = Vec::with_capacity(message_ids.len());
        let mut pending: FuturesUnordered<_> = message_ids
            .iter()
            .map(|id| self.resolve_message(id))
            .collect();

        while let Some(outcome) = pending.next().await {
            if let MessageOutcome::Resolved(message) = &outcome {
                if let Err(e) = self
                    .writer
                    .attach_message(chat_id.to_string(), message.local_id)
                    .await
                {
                    error!(
                        "[ChatSync] 挂载消息 {} 到会话 {} 失败: {:#}",
                        message.message_id, chat_id, e
                    );
                    outcomes.push(MessageOutcome::Failed {
                        message_id: message.message_id.clone(),
                        error: SyncError::local(e).to_string(),
                    });
                    continue;
                }
            }
            outcomes.push(outcome);
        }
        outcomes
    }

    /// 获取对方资料并写入昵称
    ///
    /// 资料文档不存在时昵称留空，会话照常挂载；其他错误时整个会话本次不挂载。
    async fn apply_counterpart_profile(&self, chat_id: &str, counterpart_id: &str) -> Result<()> {
        let name = match self
            .documents
            .get_document(&self.config.users_collection, counterpart_id)
            .await
        {
            Ok(profile) => {
                let name = profile.get_str(DISPLAY_NAME_FIELD).map(str::to_string);
                if name.is_none() {
                    warn!("[ChatSync] 用户 {} 的资料中没有昵称", counterpart_id);
                }
                name
            }
            Err(SyncError::NotFound(path)) => {
                warn!("[ChatSync] 用户资料不存在: {}", path);
                None
            }
            Err(e) => {
                error!("[ChatSync] 无法获取用户资料 {}: {}", counterpart_id, e);
                return Err(e);
            }
        };

        self.writer
            .set_counterpart_name(chat_id.to_string(), name)
            .await
            .map_err(SyncError::local)
    }

    /// 按 ID 解析一条消息并创建本地记录
    ///
    /// 失败时返回 `MessageOutcome::Failed`，调用方应跳过该消息。
    /// 时间戳缺失时保持为空，不会用本地时间代替。
    pub async fn resolve_message(&self, id: &str) -> MessageOutcome {
        if id.is_empty() {
            return MessageOutcome::Failed {
                message_id: String::new(),
                error: SyncError::IllegalArgument("消息 ID 为空".to_string()).to_string(),
            };
        }

        let doc = match self
            .documents
            .get_document(&self.config.messages_collection, id)
            .await
        {
            Ok(doc) => doc,
            Err(e) => {
                error!("[ChatSync] 无法获取消息数据 {}: {}", id, e);
                return MessageOutcome::Failed {
                    message_id: id.to_string(),
                    error: e.to_string(),
                };
            }
        };

        match self
            .writer
            .insert_message(
                doc.id.clone(),
                doc.get_str(SENDER_FIELD).map(str::to_string),
                doc.get_str(BODY_FIELD).map(str::to_string),
                doc.get_timestamp(TIMESTAMP_FIELD),
            )
            .await
        {
            Ok(message) => MessageOutcome::Resolved(message),
            Err(e) => {
                error!("[ChatSync] 无法创建消息记录 {}: {:#}", id, e);
                MessageOutcome::Failed {
                    message_id: id.to_string(),
                    error: SyncError::local(e).to_string(),
                }
            }
        }
    }

    /// 发送消息：先写消息文档，成功后再把 ID 并入会话的消息列表
    ///
    /// 只有两次写入都成功才返回新消息 ID。第二次写入失败时消息文档
    /// 不会回滚，返回 `SyncError::OrphanedMessage`。
    pub async fn send_message(&self, text: &str, chat: &LocalChat, sender: &Sender) -> Result<String> {
        if text.is_empty() {
            return Err(SyncError::IllegalArgument("消息内容为空".to_string()));
        }
        if chat.chat_id.is_empty() {
            return Err(SyncError::IllegalArgument("会话 ID 为空".to_string()));
        }
        if sender.id.is_empty() {
            return Err(SyncError::IllegalArgument("发送者 ID 为空".to_string()));
        }

        let mut fields = WriteFields::new();
        fields.insert(BODY_FIELD.to_string(), text.into());
        fields.insert(SENDER_FIELD.to_string(), sender.id.as_str().into());
        fields.insert(TIMESTAMP_FIELD.to_string(), WriteValue::ServerTimestamp);

        let message_id = self
            .documents
            .add_document(&self.config.messages_collection, fields)
            .await
            .map_err(|e| {
                error!("[ChatSync] 写入消息文档失败: {}", e);
                e
            })?;
        debug!("[ChatSync] 消息文档已写入: {}", message_id);

        if let Err(e) = self.link_message(&chat.chat_id, &message_id).await {
            error!(
                "[ChatSync] 消息 {} 已写入，但更新会话 {} 失败: {}",
                message_id, chat.chat_id, e
            );
            return Err(SyncError::OrphanedMessage {
                message_id,
                chat_id: chat.chat_id.clone(),
                source: Box::new(e),
            });
        }

        info!("[ChatSync] ✅ 消息 {} 已发送到会话 {}", message_id, chat.chat_id);
        self.listener
            .on_message_sent(chat.chat_id.clone(), message_id.clone())
            .await;
        Ok(message_id)
    }

    /// 把消息 ID 并入会话的消息列表（集合并集，重复添加无效果）
    pub async fn link_message(&self, chat_id: &str, message_id: &str) -> Result<()> {
        self.documents
            .merge_array_union(
                &self.config.chats_collection,
                chat_id,
                MESSAGES_FIELD,
                vec![message_id.to_string()],
            )
            .await
    }

    /// 根据发送者昵称生成头像
    pub fn get_avatar_for(&self, sender: &Sender) -> Avatar {
        Avatar::from_display_name(&sender.display_name)
    }
}
