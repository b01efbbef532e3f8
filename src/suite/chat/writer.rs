//! 本地存储单写者
//!
//! 所有对本地记录的修改都经过同一个后台任务串行执行，
//! 并发的回调（消息解析、资料获取）只向队列投递命令并等待回复。
//! 读操作不经过这里，直接使用 [`ChatDao`]。

use crate::suite::chat::dao::ChatDao;
use crate::suite::chat::models::{LocalChat, LocalMessage, LocalUser};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

/// 写命令
enum WriteCommand {
    UpsertUser {
        user: LocalUser,
        reply: oneshot::Sender<Result<()>>,
    },
    CreateChat {
        chat_id: String,
        counterpart_id: String,
        reply: oneshot::Sender<Result<LocalChat>>,
    },
    FindOrCreateChat {
        chat_id: String,
        counterpart_id: String,
        reply: oneshot::Sender<Result<(LocalChat, bool)>>,
    },
    SetCounterpartName {
        chat_id: String,
        name: Option<String>,
        reply: oneshot::Sender<Result<()>>,
    },
    InsertMessage {
        message_id: String,
        sender_id: Option<String>,
        body: Option<String>,
        timestamp: Option<DateTime<Utc>>,
        reply: oneshot::Sender<Result<LocalMessage>>,
    },
    AttachMessage {
        chat_id: String,
        local_id: i64,
        reply: oneshot::Sender<Result<()>>,
    },
    ReplaceUserChats {
        user_id: String,
        chat_ids: Vec<String>,
        reply: oneshot::Sender<Result<()>>,
    },
}

/// 单写者句柄，可随意克隆；最后一个句柄释放后后台任务退出
#[derive(Clone)]
pub struct StoreWriter {
    tx: mpsc::Sender<WriteCommand>,
}

impl StoreWriter {
    /// 启动写任务
    pub fn spawn(dao: ChatDao, queue_size: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<WriteCommand>(queue_size.max(1));

        tokio::spawn(async move {
            debug!("[Writer] 写任务已启动");
            while let Some(cmd) = rx.recv().await {
                // 回复端被丢弃说明调用方已不关心结果，忽略发送失败
                match cmd {
                    WriteCommand::UpsertUser { user, reply } => {
                        let _ = reply.send(dao.upsert_user(&user).await);
                    }
                    WriteCommand::CreateChat {
                        chat_id,
                        counterpart_id,
                        reply,
                    } => {
                        let _ = reply.send(dao.create_chat(&chat_id, &counterpart_id).await);
                    }
                    WriteCommand::FindOrCreateChat {
                        chat_id,
                        counterpart_id,
                        reply,
                    } => {
                        let _ = reply
                            .send(dao.find_or_create_chat(&chat_id, &counterpart_id).await);
                    }
                    WriteCommand::SetCounterpartName {
                        chat_id,
                        name,
                        reply,
                    } => {
                        let _ = reply.send(
                            dao.set_counterpart_name(&chat_id, name.as_deref()).await,
                        );
                    }
                    WriteCommand::InsertMessage {
                        message_id,
                        sender_id,
                        body,
                        timestamp,
                        reply,
                    } => {
                        let result = dao
                            .insert_message(
                                &message_id,
                                sender_id.as_deref(),
                                body.as_deref(),
                                timestamp,
                            )
                            .await;
                        let _ = reply.send(result);
                    }
                    WriteCommand::AttachMessage {
                        chat_id,
                        local_id,
                        reply,
                    } => {
                        let _ = reply.send(dao.attach_message(&chat_id, local_id).await);
                    }
                    WriteCommand::ReplaceUserChats {
                        user_id,
                        chat_ids,
                        reply,
                    } => {
                        let _ = reply.send(dao.replace_user_chats(&user_id, &chat_ids).await);
                    }
                }
            }
            info!("[Writer] 写队列已关闭，写任务退出");
        });

        Self { tx }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> WriteCommand,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| anyhow!("写队列已关闭"))?;
        reply_rx.await.map_err(|_| anyhow!("写任务未返回结果"))?
    }

    pub async fn upsert_user(&self, user: LocalUser) -> Result<()> {
        self.request(|reply| WriteCommand::UpsertUser { user, reply })
            .await
    }

    pub async fn create_chat(&self, chat_id: String, counterpart_id: String) -> Result<LocalChat> {
        self.request(|reply| WriteCommand::CreateChat {
            chat_id,
            counterpart_id,
            reply,
        })
        .await
    }

    /// 查找或新建会话，在写任务内一次完成；第二项为 true 表示本次新建
    pub async fn find_or_create_chat(
        &self,
        chat_id: String,
        counterpart_id: String,
    ) -> Result<(LocalChat, bool)> {
        self.request(|reply| WriteCommand::FindOrCreateChat {
            chat_id,
            counterpart_id,
            reply,
        })
        .await
    }

    pub async fn set_counterpart_name(&self, chat_id: String, name: Option<String>) -> Result<()> {
        self.request(|reply| WriteCommand::SetCounterpartName {
            chat_id,
            name,
            reply,
        })
        .await
    }

    pub async fn insert_message(
        &self,
        message_id: String,
        sender_id: Option<String>,
        body: Option<String>,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<LocalMessage> {
        self.request(|reply| WriteCommand::InsertMessage {
            message_id,
            sender_id,
            body,
            timestamp,
            reply,
        })
        .await
    }

    pub async fn attach_message(&self, chat_id: String, local_id: i64) -> Result<()> {
        self.request(|reply| WriteCommand::AttachMessage {
            chat_id,
            local_id,
            reply,
        })
        .await
    }

    pub async fn replace_user_chats(&self, user_id: String, chat_ids: Vec<String>) -> Result<()> {
        self.request(|reply| WriteCommand::ReplaceUserChats {
            user_id,
            chat_ids,
            reply,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::db::create_memory_pool;
    use futures_util::future::join_all;

    #[tokio::test]
    async fn test_concurrent_attachments_are_serialized() {
        let dao = ChatDao::new(create_memory_pool().await.unwrap());
        let writer = StoreWriter::spawn(dao.clone(), 4);
        writer
            .create_chat("c1".to_string(), "x".to_string())
            .await
            .unwrap();

        // 多个并发调用方同时插入并挂载，位置不能重复
        let tasks = (0..20).map(|i| {
            let writer = writer.clone();
            async move {
                let msg = writer
                    .insert_message(format!("m{}", i), None, Some(format!("body {}", i)), None)
                    .await
                    .unwrap();
                writer
                    .attach_message("c1".to_string(), msg.local_id)
                    .await
                    .unwrap();
            }
        });
        join_all(tasks).await;

        let messages = dao.get_chat_messages("c1").await.unwrap();
        assert_eq!(messages.len(), 20);
        let mut ids: Vec<String> = messages.into_iter().map(|m| m.message_id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 20);
    }

    #[tokio::test]
    async fn test_dao_errors_are_returned_to_caller() {
        let dao = ChatDao::new(create_memory_pool().await.unwrap());
        let writer = StoreWriter::spawn(dao, 4);
        writer
            .create_chat("c1".to_string(), "x".to_string())
            .await
            .unwrap();
        let err = writer
            .create_chat("c1".to_string(), "x".to_string())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("创建会话记录失败"));
    }

    #[tokio::test]
    async fn test_concurrent_find_or_create_creates_once() {
        let dao = ChatDao::new(create_memory_pool().await.unwrap());
        let writer = StoreWriter::spawn(dao.clone(), 4);

        let tasks = (0..8).map(|_| {
            let writer = writer.clone();
            async move {
                writer
                    .find_or_create_chat("c1".to_string(), "x".to_string())
                    .await
                    .unwrap()
            }
        });
        let results = join_all(tasks).await;

        let created = results.iter().filter(|(_, created)| *created).count();
        assert_eq!(created, 1);
        assert!(results.iter().all(|(chat, _)| chat.chat_id == "c1"));
        assert!(dao.find_chat("c1").await.unwrap().is_some());
    }
}
