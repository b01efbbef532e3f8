//! 进程内文档数据库
//!
//! 用于离线模式和测试：支持按文档注入失败、注入延迟，
//! 并按集合统计读取次数。

use crate::suite::document::store::{DocumentSnapshot, DocumentStore, Fields, WriteFields, WriteValue};
use crate::suite::error::{Result, SyncError};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    collections: HashMap<String, BTreeMap<String, Fields>>,
    failing_gets: HashSet<(String, String)>,
    get_delays: HashMap<(String, String), Duration>,
    fail_queries: bool,
    fail_adds: bool,
    fail_merges: bool,
    get_counts: HashMap<String, usize>,
    query_count: usize,
}

/// 内存文档数据库
#[derive(Default)]
pub struct MemoryDocumentStore {
    inner: Mutex<Inner>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // 锁中毒只可能来自测试中的 panic，继续使用内部数据即可
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 直接写入一份文档（覆盖同 ID 文档）
    pub fn insert(&self, collection: &str, id: &str, fields: Value) {
        let fields = match fields {
            Value::Object(map) => map,
            _ => Fields::new(),
        };
        self.lock()
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
    }

    /// 删除一份文档
    pub fn remove(&self, collection: &str, id: &str) -> Option<Fields> {
        self.lock()
            .collections
            .get_mut(collection)
            .and_then(|c| c.remove(id))
    }

    /// 读取一份文档的当前字段
    pub fn fields(&self, collection: &str, id: &str) -> Option<Fields> {
        self.lock()
            .collections
            .get(collection)
            .and_then(|c| c.get(id))
            .cloned()
    }

    /// 集合中的文档数
    pub fn len(&self, collection: &str) -> usize {
        self.lock()
            .collections
            .get(collection)
            .map(|c| c.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// 让指定文档的读取返回传输失败
    pub fn fail_get(&self, collection: &str, id: &str) {
        self.lock()
            .failing_gets
            .insert((collection.to_string(), id.to_string()));
    }

    /// 为指定文档的读取增加延迟
    pub fn delay_get(&self, collection: &str, id: &str, delay: Duration) {
        self.lock()
            .get_delays
            .insert((collection.to_string(), id.to_string()), delay);
    }

    pub fn fail_queries(&self, fail: bool) {
        self.lock().fail_queries = fail;
    }

    pub fn fail_adds(&self, fail: bool) {
        self.lock().fail_adds = fail;
    }

    pub fn fail_merges(&self, fail: bool) {
        self.lock().fail_merges = fail;
    }

    /// 某集合累计的按 ID 读取次数
    pub fn get_count(&self, collection: &str) -> usize {
        self.lock().get_counts.get(collection).copied().unwrap_or(0)
    }

    pub fn query_count(&self) -> usize {
        self.lock().query_count
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn query_array_contains(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<DocumentSnapshot>> {
        let mut inner = self.lock();
        inner.query_count += 1;
        if inner.fail_queries {
            return Err(SyncError::Transport(format!("查询 {} 失败", collection)));
        }
        let docs = inner
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, fields)| {
                        fields
                            .get(field)
                            .and_then(Value::as_array)
                            .map(|arr| arr.iter().any(|v| v.as_str() == Some(value)))
                            .unwrap_or(false)
                    })
                    .map(|(id, fields)| DocumentSnapshot::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(docs)
    }

    async fn get_document(&self, collection: &str, id: &str) -> Result<DocumentSnapshot> {
        let key = (collection.to_string(), id.to_string());
        let delay = {
            let mut inner = self.lock();
            *inner.get_counts.entry(collection.to_string()).or_insert(0) += 1;
            inner.get_delays.get(&key).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let inner = self.lock();
        if inner.failing_gets.contains(&key) {
            return Err(SyncError::Transport(format!("读取 {}/{} 失败", collection, id)));
        }
        inner
            .collections
            .get(collection)
            .and_then(|c| c.get(id))
            .map(|fields| DocumentSnapshot::new(id, fields.clone()))
            .ok_or_else(|| SyncError::NotFound(format!("{}/{}", collection, id)))
    }

    async fn add_document(&self, collection: &str, fields: WriteFields) -> Result<String> {
        let mut inner = self.lock();
        if inner.fail_adds {
            return Err(SyncError::Transport(format!("写入 {} 失败", collection)));
        }
        let id = Uuid::new_v4().simple().to_string();
        let stored: Fields = fields
            .into_iter()
            .map(|(k, v)| {
                let value = match v {
                    WriteValue::Value(value) => value,
                    WriteValue::ServerTimestamp => Value::String(Utc::now().to_rfc3339()),
                };
                (k, value)
            })
            .collect();
        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), stored);
        debug!("[MemoryStore] 新增文档 {}/{}", collection, id);
        Ok(id)
    }

    async fn merge_array_union(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        values: Vec<String>,
    ) -> Result<()> {
        let mut inner = self.lock();
        if inner.fail_merges {
            return Err(SyncError::Transport(format!("更新 {}/{} 失败", collection, id)));
        }
        let doc = inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .entry(id.to_string())
            .or_default();
        let entry = doc
            .entry(field.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if !entry.is_array() {
            *entry = Value::Array(Vec::new());
        }
        if let Value::Array(arr) = entry {
            for value in values {
                if !arr.iter().any(|v| v.as_str() == Some(value.as_str())) {
                    arr.push(Value::String(value));
                }
            }
        }
        Ok(())
    }
}
