pub mod chat;
pub mod client;
pub mod config;
pub mod db;
pub mod document;
pub mod error;
pub mod github;
#[cfg(test)]
pub(crate) mod testing;
pub mod types;

// 重新导出会话同步相关类型
pub use chat::{ChatSyncer, LocalChat, LocalMessage, LocalUser, Sender, SyncReport};
pub use client::DevSuiteClient;
pub use config::SdkConfig;
pub use error::{Result, SyncError};
pub use github::GithubSyncer;
