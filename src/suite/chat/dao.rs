//! 聊天数据访问层（DAO）
//!
//! 负责用户、会话、消息及其挂载关系的数据库操作。
//! 写操作只允许由 [`StoreWriter`](crate::suite::chat::writer::StoreWriter) 调用，
//! 读操作可以直接使用。

use crate::suite::chat::models::{LocalChat, LocalMessage, LocalUser};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info};

/// 聊天 DAO（基于 sqlx）
#[derive(Clone)]
pub struct ChatDao {
    db: Pool<Sqlite>,
}

impl ChatDao {
    /// 创建新的聊天 DAO
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    /// 初始化数据库表结构
    pub async fn init_db(&self) -> Result<()> {
        Self::init_db_with_connection(&self.db).await
    }

    /// 使用共享连接初始化数据库表结构（静态方法）
    pub async fn init_db_with_connection(db: &Pool<Sqlite>) -> Result<()> {
        info!("[ChatDAO/DB] 初始化聊天数据库表结构");

        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS local_users (
                user_id TEXT PRIMARY KEY,
                display_name TEXT
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS local_chats (
                chat_id TEXT PRIMARY KEY,
                counterpart_id TEXT NOT NULL,
                counterpart_name TEXT,
                create_time INTEGER NOT NULL DEFAULT 0
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS local_messages (
                local_id INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id TEXT NOT NULL,
                chat_id TEXT,
                position INTEGER,
                sender_id TEXT,
                body TEXT,
                timestamp INTEGER
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_local_messages_chat
                ON local_messages(chat_id, position)
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS local_user_chats (
                user_id TEXT NOT NULL,
                chat_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                PRIMARY KEY (user_id, chat_id)
            )
            "#,
        ];
        for sql in statements {
            sqlx::query(sql)
                .execute(db)
                .await
                .context("创建聊天表失败")?;
        }

        info!("[ChatDAO/DB] 数据库表初始化完成");
        Ok(())
    }

    /// 插入用户（已存在时只更新昵称）
    pub async fn upsert_user(&self, user: &LocalUser) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO local_users (user_id, display_name) VALUES (?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                display_name = COALESCE(excluded.display_name, local_users.display_name)
            "#,
        )
        .bind(&user.user_id)
        .bind(&user.display_name)
        .execute(&self.db)
        .await
        .context("插入用户失败")?;
        Ok(())
    }

    /// 按远端 ID 查找会话（含消息）
    pub async fn find_chat(&self, chat_id: &str) -> Result<Option<LocalChat>> {
        let row = sqlx::query(
            r#"
            SELECT chat_id, counterpart_id, counterpart_name
            FROM local_chats
            WHERE chat_id = ?
            "#,
        )
        .bind(chat_id)
        .fetch_optional(&self.db)
        .await
        .context("查询会话失败")?;

        match row {
            Some(row) => {
                let messages = self.get_chat_messages(chat_id).await?;
                Ok(Some(Self::row_to_chat(&row, messages)))
            }
            None => Ok(None),
        }
    }

    /// 新建会话记录
    pub async fn create_chat(&self, chat_id: &str, counterpart_id: &str) -> Result<LocalChat> {
        sqlx::query(
            r#"
            INSERT INTO local_chats (chat_id, counterpart_id, create_time)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(chat_id)
        .bind(counterpart_id)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.db)
        .await
        .with_context(|| format!("创建会话记录失败: {}", chat_id))?;

        debug!("[ChatDAO] 新建会话 {}，对方: {}", chat_id, counterpart_id);
        Ok(LocalChat {
            chat_id: chat_id.to_string(),
            counterpart_id: counterpart_id.to_string(),
            counterpart_name: None,
            messages: Vec::new(),
        })
    }

    /// 查找会话，不存在时新建；第二项为 true 表示本次新建
    ///
    /// 查找和插入之间不加锁，只应由单写者任务调用。
    pub async fn find_or_create_chat(
        &self,
        chat_id: &str,
        counterpart_id: &str,
    ) -> Result<(LocalChat, bool)> {
        if let Some(chat) = self.find_chat(chat_id).await? {
            return Ok((chat, false));
        }
        let chat = self.create_chat(chat_id, counterpart_id).await?;
        Ok((chat, true))
    }

    /// 设置对方昵称
    pub async fn set_counterpart_name(&self, chat_id: &str, name: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE local_chats SET counterpart_name = ? WHERE chat_id = ?")
            .bind(name)
            .bind(chat_id)
            .execute(&self.db)
            .await
            .context("更新对方昵称失败")?;
        Ok(())
    }

    /// 新建一条未挂载的消息记录
    pub async fn insert_message(
        &self,
        message_id: &str,
        sender_id: Option<&str>,
        body: Option<&str>,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<LocalMessage> {
        let result = sqlx::query(
            r#"
            INSERT INTO local_messages (message_id, sender_id, body, timestamp)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(message_id)
        .bind(sender_id)
        .bind(body)
        .bind(timestamp.map(|t| t.timestamp_millis()))
        .execute(&self.db)
        .await
        .with_context(|| format!("插入消息失败: {}", message_id))?;

        Ok(LocalMessage {
            local_id: result.last_insert_rowid(),
            message_id: message_id.to_string(),
            sender_id: sender_id.map(str::to_string),
            body: body.map(str::to_string),
            timestamp: timestamp.and_then(|t| DateTime::from_timestamp_millis(t.timestamp_millis())),
        })
    }

    /// 把消息挂到会话末尾
    pub async fn attach_message(&self, chat_id: &str, local_id: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE local_messages
            SET chat_id = ?,
                position = (
                    SELECT COALESCE(MAX(position) + 1, 0)
                    FROM local_messages
                    WHERE chat_id = ?
                )
            WHERE local_id = ?
            "#,
        )
        .bind(chat_id)
        .bind(chat_id)
        .bind(local_id)
        .execute(&self.db)
        .await
        .context("挂载消息失败")?;
        Ok(())
    }

    /// 获取会话的消息，按挂载顺序
    pub async fn get_chat_messages(&self, chat_id: &str) -> Result<Vec<LocalMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT local_id, message_id, sender_id, body, timestamp
            FROM local_messages
            WHERE chat_id = ?
            ORDER BY position ASC
            "#,
        )
        .bind(chat_id)
        .fetch_all(&self.db)
        .await
        .context("查询会话消息失败")?;

        Ok(rows.iter().map(Self::row_to_message).collect())
    }

    /// 用新的有序集合整体替换用户的会话列表
    pub async fn replace_user_chats(&self, user_id: &str, chat_ids: &[String]) -> Result<()> {
        let mut tx = self.db.begin().await.context("开启事务失败")?;

        sqlx::query("DELETE FROM local_user_chats WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .context("清空用户会话列表失败")?;

        for (position, chat_id) in chat_ids.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO local_user_chats (user_id, chat_id, position)
                VALUES (?, ?, ?)
                "#,
            )
            .bind(user_id)
            .bind(chat_id)
            .bind(position as i64)
            .execute(&mut *tx)
            .await
            .context("写入用户会话列表失败")?;
        }

        tx.commit().await.context("提交事务失败")?;
        debug!(
            "[ChatDAO] 用户 {} 的会话列表已替换，共 {} 个",
            user_id,
            chat_ids.len()
        );
        Ok(())
    }

    /// 获取用户的会话 ID 列表，按挂载顺序
    pub async fn get_user_chat_ids(&self, user_id: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT chat_id FROM local_user_chats WHERE user_id = ? ORDER BY position ASC",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await
        .context("查询用户会话ID列表失败")?;

        Ok(rows
            .into_iter()
            .map(|m| m.get::<String, _>("chat_id"))
            .collect())
    }

    /// 获取用户的会话（含消息），按挂载顺序
    pub async fn get_user_chats(&self, user_id: &str) -> Result<Vec<LocalChat>> {
        let mut chats = Vec::new();
        for chat_id in self.get_user_chat_ids(user_id).await? {
            if let Some(chat) = self.find_chat(&chat_id).await? {
                chats.push(chat);
            }
        }
        debug!("[ChatDAO] 获取用户 {} 的会话，共 {} 个", user_id, chats.len());
        Ok(chats)
    }

    fn row_to_chat(row: &SqliteRow, messages: Vec<LocalMessage>) -> LocalChat {
        LocalChat {
            chat_id: row.get("chat_id"),
            counterpart_id: row.get("counterpart_id"),
            counterpart_name: row.get("counterpart_name"),
            messages,
        }
    }

    fn row_to_message(row: &SqliteRow) -> LocalMessage {
        let timestamp: Option<i64> = row.get("timestamp");
        LocalMessage {
            local_id: row.get("local_id"),
            message_id: row.get("message_id"),
            sender_id: row.get("sender_id"),
            body: row.get("body"),
            timestamp: timestamp.and_then(DateTime::from_timestamp_millis),
        }
    }
}
