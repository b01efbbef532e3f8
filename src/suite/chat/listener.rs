//! 聊天监听器回调接口

use async_trait::async_trait;

/// 聊天监听器回调接口
///
/// 回调在发起同步的任务上依次触发。
#[async_trait]
pub trait ChatListener: Send + Sync {
    /// 会话同步开始
    async fn on_sync_start(&self, user_id: String);

    /// 会话同步完成，参数为 `SyncReport` 的 JSON
    async fn on_sync_finish(&self, report_json: String);

    /// 会话查询失败，本次同步没有修改本地数据
    async fn on_sync_failed(&self, user_id: String, error: String);

    /// 消息发送完成（两次写入都已成功）
    async fn on_message_sent(&self, chat_id: String, message_id: String);
}

/// 空实现（默认监听器）
pub struct EmptyChatListener;

#[async_trait]
impl ChatListener for EmptyChatListener {
    async fn on_sync_start(&self, _user_id: String) {}
    async fn on_sync_finish(&self, _report_json: String) {}
    async fn on_sync_failed(&self, _user_id: String, _error: String) {}
    async fn on_message_sent(&self, _chat_id: String, _message_id: String) {}
}
