pub mod suite;

// 重新导出常用类型，方便外部使用
pub use suite::{
    chat::{ChatListener, ChatOutcome},
    ChatSyncer, DevSuiteClient, GithubSyncer, LocalChat, LocalUser, SdkConfig, Sender, SyncError,
    SyncReport,
};
