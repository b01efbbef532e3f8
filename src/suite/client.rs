//! Developer Suite 客户端
//!
//! 由调用方显式构造并持有：负责创建连接池、文档数据库客户端和各个同步器，
//! 进程内不存在全局单例。

use crate::suite::chat::{
    ChatListener, ChatSyncer, ChatSyncerConfig, EmptyChatListener, LocalChat, LocalUser, Sender,
    SyncReport,
};
use crate::suite::config::SdkConfig;
use crate::suite::db::{create_memory_pool, create_sqlite_pool};
use crate::suite::document::{DocumentStore, FirestoreClient, MemoryDocumentStore};
use crate::suite::github::GithubSyncer;
use anyhow::{bail, Context, Result};
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use tracing::info;

pub struct DevSuiteClient {
    config: SdkConfig,
    db: Pool<Sqlite>,
    documents: Arc<dyn DocumentStore>,
    chat_syncer: ChatSyncer,
    github_syncer: GithubSyncer,
}

impl DevSuiteClient {
    /// 连接本地 SQLite 与 Firestore
    pub async fn connect(config: SdkConfig) -> Result<Self> {
        if config.firestore.project_id.is_empty() {
            bail!("未配置 Firestore 项目 ID（DEVSUITE_FIRESTORE_PROJECT）");
        }
        let db = create_sqlite_pool(&config.db_url).await?;
        let documents: Arc<dyn DocumentStore> = Arc::new(
            FirestoreClient::from_config(&config.firestore).context("创建 Firestore 客户端失败")?,
        );
        info!(
            "[Client] 已连接，Firestore 项目: {}",
            config.firestore.project_id
        );
        Self::with_document_store(config, documents, db)
    }

    /// 离线模式：内存数据库 + 空的内存文档库
    pub async fn offline(config: SdkConfig) -> Result<Self> {
        let db = create_memory_pool().await?;
        info!("[Client] 离线模式启动");
        Self::with_document_store(config, Arc::new(MemoryDocumentStore::new()), db)
    }

    /// 使用外部提供的文档库和连接池（连接池的表结构需已初始化）
    pub fn with_document_store(
        config: SdkConfig,
        documents: Arc<dyn DocumentStore>,
        db: Pool<Sqlite>,
    ) -> Result<Self> {
        let chat_syncer = ChatSyncer::with_listener(
            ChatSyncerConfig::default(),
            documents.clone(),
            db.clone(),
            Arc::new(EmptyChatListener),
        );
        let github_syncer =
            GithubSyncer::new(&config.github, db.clone()).context("创建 GitHub 同步器失败")?;
        Ok(Self {
            config,
            db,
            documents,
            chat_syncer,
            github_syncer,
        })
    }

    /// 注册聊天监听器
    ///
    /// 用新的监听器重建聊天同步器；必须在 tokio 运行时内调用。
    pub fn set_chat_listener(&mut self, listener: Arc<dyn ChatListener>) {
        self.chat_syncer = ChatSyncer::with_listener(
            ChatSyncerConfig::default(),
            self.documents.clone(),
            self.db.clone(),
            listener,
        );
    }

    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    pub fn chat(&self) -> &ChatSyncer {
        &self.chat_syncer
    }

    pub fn github(&self) -> &GithubSyncer {
        &self.github_syncer
    }

    /// 同步用户的会话并返回本地结果
    pub async fn fetch_chats(&self, user_id: &str) -> Result<(SyncReport, Vec<LocalChat>)> {
        let report = self.chat_syncer.fetch_chats(&LocalUser::new(user_id)).await?;
        let chats = self.chat_syncer.get_user_chats(user_id).await?;
        Ok((report, chats))
    }

    /// 向会话发送文本消息
    ///
    /// 会话不必已同步到本地，只需要远端 ID。
    pub async fn send_text(&self, chat_id: &str, sender: &Sender, text: &str) -> Result<String> {
        let chat = match self.chat_syncer.find_chat(chat_id).await? {
            Some(chat) => chat,
            None => LocalChat {
                chat_id: chat_id.to_string(),
                counterpart_id: String::new(),
                counterpart_name: None,
                messages: Vec::new(),
            },
        };
        Ok(self.chat_syncer.send_message(text, &chat, sender).await?)
    }
}
