//! 聊天模块
//!
//! 实现双人会话的拉取、本地物化和消息发送

pub mod dao;
pub mod listener;
pub mod models;
pub mod service;
pub mod types;
pub mod writer;

// 重新导出主要类型
pub use dao::ChatDao;
pub use listener::{ChatListener, EmptyChatListener};
pub use models::{Avatar, ChatSyncerConfig, LocalChat, LocalMessage, LocalUser, Sender};
pub use service::ChatSyncer;
pub use types::{ChatOutcome, MessageOutcome, SkipReason, SyncReport};
pub use writer::StoreWriter;
