//! 文档数据库协作者接口
//!
//! 同步引擎只依赖这里的 trait，具体实现可以是 Firestore REST
//! 客户端，也可以是进程内的内存实现。

use crate::suite::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// 文档字段（已解码为普通 JSON 值，时间戳以 RFC3339 字符串表示）
pub type Fields = Map<String, Value>;

/// 一份远端文档快照
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    /// 文档 ID
    pub id: String,
    /// 文档字段
    pub fields: Fields,
}

impl DocumentSnapshot {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// 读取字符串字段
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// 读取字符串数组字段；字段缺失或含有非字符串元素时返回 None
    pub fn get_string_array(&self, field: &str) -> Option<Vec<String>> {
        self.fields.get(field)?.as_array()?.iter().try_fold(
            Vec::new(),
            |mut acc, item| {
                acc.push(item.as_str()?.to_string());
                Some(acc)
            },
        )
    }

    /// 读取时间戳字段；缺失、为 null 或无法解析时返回 None
    pub fn get_timestamp(&self, field: &str) -> Option<DateTime<Utc>> {
        let raw = self.get_str(field)?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// 写入时使用的字段值
#[derive(Debug, Clone, PartialEq)]
pub enum WriteValue {
    /// 普通 JSON 值
    Value(Value),
    /// 由服务端填写的提交时间
    ServerTimestamp,
}

impl From<&str> for WriteValue {
    fn from(s: &str) -> Self {
        WriteValue::Value(Value::String(s.to_string()))
    }
}

impl From<String> for WriteValue {
    fn from(s: String) -> Self {
        WriteValue::Value(Value::String(s))
    }
}

/// 写入字段集合
pub type WriteFields = BTreeMap<String, WriteValue>;

/// 文档数据库协作者
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// 查询 `collection` 中 `field` 数组包含 `value` 的所有文档
    async fn query_array_contains(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<DocumentSnapshot>>;

    /// 按 ID 获取文档，不存在时返回 `SyncError::NotFound`
    async fn get_document(&self, collection: &str, id: &str) -> Result<DocumentSnapshot>;

    /// 新增文档，返回服务端分配的文档 ID
    async fn add_document(&self, collection: &str, fields: WriteFields) -> Result<String>;

    /// 以集合并集方式向数组字段追加值（文档不存在时按 merge 语义创建）
    async fn merge_array_union(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        values: Vec<String>,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(value: Value) -> DocumentSnapshot {
        let fields = value.as_object().cloned().unwrap_or_default();
        DocumentSnapshot::new("doc", fields)
    }

    #[test]
    fn test_string_array_rejects_mixed_elements() {
        let doc = snapshot(json!({ "participants": ["u1", 2] }));
        assert_eq!(doc.get_string_array("participants"), None);

        let doc = snapshot(json!({ "participants": ["u1", "u2"] }));
        assert_eq!(
            doc.get_string_array("participants"),
            Some(vec!["u1".to_string(), "u2".to_string()])
        );
        assert_eq!(doc.get_string_array("missing"), None);
    }

    #[test]
    fn test_timestamp_is_never_defaulted() {
        let doc = snapshot(json!({ "timestamp": null, "other": "not a date" }));
        assert_eq!(doc.get_timestamp("timestamp"), None);
        assert_eq!(doc.get_timestamp("other"), None);
        assert_eq!(doc.get_timestamp("absent"), None);

        let doc = snapshot(json!({ "timestamp": "2018-12-04T10:00:00Z" }));
        let ts = doc.get_timestamp("timestamp").unwrap();
        assert_eq!(ts.to_rfc3339(), "2018-12-04T10:00:00+00:00");
    }
}
