//! Firestore REST 客户端
//!
//! 通过 Firestore v1 REST 接口实现 [`DocumentStore`]：
//! - 查询：`:runQuery` + `ARRAY_CONTAINS` 过滤
//! - 读取：`GET documents/{collection}/{id}`
//! - 写入：`:commit`，服务端时间戳和数组并集都通过字段变换完成

use crate::suite::config::DocumentStoreConfig;
use crate::suite::document::store::{DocumentSnapshot, DocumentStore, Fields, WriteFields, WriteValue};
use crate::suite::error::{Result, SyncError};
use crate::suite::types::handle_http_response;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

/// Firestore REST 客户端
pub struct FirestoreClient {
    client: reqwest::Client,
    api_base_url: String,
    project_id: String,
}

impl FirestoreClient {
    /// 创建新的 Firestore 客户端
    ///
    /// `client` 应该已经在外部配置好认证头
    pub fn new(client: reqwest::Client, api_base_url: String, project_id: String) -> Self {
        Self {
            client,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            project_id,
        }
    }

    /// 按配置创建客户端（token 通过 default_headers 自动添加）
    pub fn from_config(config: &DocumentStoreConfig) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(token) = &config.token {
            headers.insert(
                reqwest::header::AUTHORIZATION,
                reqwest::header::HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| SyncError::IllegalArgument(format!("无效的 token: {}", e)))?,
            );
        }
        let client = reqwest::ClientBuilder::new()
            .default_headers(headers)
            .build()?;
        Ok(Self::new(
            client,
            config.api_base_url.clone(),
            config.project_id.clone(),
        ))
    }

    /// 文档资源名前缀：`projects/{p}/databases/(default)/documents`
    fn documents_path(&self) -> String {
        format!("projects/{}/databases/(default)/documents", self.project_id)
    }

    fn document_name(&self, collection: &str, id: &str) -> String {
        format!("{}/{}/{}", self.documents_path(), collection, id)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base_url, path)
    }

    async fn commit(&self, writes: Vec<Value>, operation_name: &str) -> Result<()> {
        let operation_id = Uuid::new_v4().to_string();
        let url = self.url(&format!(
            "projects/{}/databases/(default)/documents:commit",
            self.project_id
        ));
        debug!("[Firestore] {} 请求URL: {}, 操作ID: {}", operation_name, url, operation_id);

        let response = self
            .client
            .post(&url)
            .json(&json!({ "writes": writes }))
            .send()
            .await?;
        let _: Value = handle_http_response(response, operation_name).await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FirestoreClient {
    async fn query_array_contains(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<DocumentSnapshot>> {
        let url = self.url(&format!("{}:runQuery", self.documents_path()));
        info!("[Firestore] 📡 查询 {}，{} 包含 {}", collection, field, value);

        let body = json!({
            "structuredQuery": {
                "from": [{ "collectionId": collection }],
                "where": {
                    "fieldFilter": {
                        "field": { "fieldPath": field },
                        "op": "ARRAY_CONTAINS",
                        "value": { "stringValue": value }
                    }
                }
            }
        });
        let response = self.client.post(&url).json(&body).send().await?;
        let rows: Vec<Value> = handle_http_response(response, "查询文档").await?;

        // 空结果时服务端只返回 readTime，没有 document
        let docs = rows
            .iter()
            .filter_map(|row| row.get("document"))
            .map(decode_document)
            .collect::<Result<Vec<_>>>()?;
        debug!("[Firestore] 查询 {} 返回 {} 个文档", collection, docs.len());
        Ok(docs)
    }

    async fn get_document(&self, collection: &str, id: &str) -> Result<DocumentSnapshot> {
        let url = self.url(&self.document_name(collection, id));
        debug!("[Firestore] 读取文档: {}/{}", collection, id);

        let response = self.client.get(&url).send().await?;
        let doc: Value = handle_http_response(response, "读取文档").await?;
        decode_document(&doc)
    }

    async fn add_document(&self, collection: &str, fields: WriteFields) -> Result<String> {
        let id = Uuid::new_v4().simple().to_string();
        let name = self.document_name(collection, &id);

        let mut encoded = Map::new();
        let mut transforms = Vec::new();
        for (key, value) in fields {
            match value {
                WriteValue::Value(v) => {
                    encoded.insert(key, encode_value(&v));
                }
                WriteValue::ServerTimestamp => transforms.push(json!({
                    "fieldPath": key,
                    "setToServerValue": "REQUEST_TIME"
                })),
            }
        }

        let write = json!({
            "update": { "name": name, "fields": encoded },
            "updateTransforms": transforms,
            "currentDocument": { "exists": false }
        });
        self.commit(vec![write], "新增文档").await?;
        info!("[Firestore] ✅ 新增文档 {}/{}", collection, id);
        Ok(id)
    }

    async fn merge_array_union(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        values: Vec<String>,
    ) -> Result<()> {
        let elements: Vec<Value> = values
            .iter()
            .map(|v| json!({ "stringValue": v }))
            .collect();
        // 空 updateMask 的 update 等价于 set(merge: true)，文档不存在时会被创建
        let write = json!({
            "update": { "name": self.document_name(collection, id), "fields": {} },
            "updateMask": { "fieldPaths": [] },
            "updateTransforms": [{
                "fieldPath": field,
                "appendMissingElements": { "values": elements }
            }]
        });
        self.commit(vec![write], "数组并集更新").await
    }
}

/// 把 REST 返回的文档解码为快照
pub fn decode_document(doc: &Value) -> Result<DocumentSnapshot> {
    let name = doc
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| SyncError::MalformedResponse("文档缺少 name 字段".to_string()))?;
    let id = name.rsplit('/').next().unwrap_or(name);

    let fields: Fields = doc
        .get("fields")
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .map(|(k, v)| (k.clone(), decode_value(v)))
                .collect()
        })
        .unwrap_or_default();
    Ok(DocumentSnapshot::new(id, fields))
}

/// Firestore 类型化值 -> 普通 JSON 值
pub fn decode_value(value: &Value) -> Value {
    let Some(obj) = value.as_object() else {
        return Value::Null;
    };
    if let Some(s) = obj.get("stringValue") {
        return s.clone();
    }
    if let Some(ts) = obj.get("timestampValue") {
        return ts.clone();
    }
    if let Some(i) = obj.get("integerValue") {
        // int64 以字符串传输
        return match i {
            Value::String(s) => s.parse::<i64>().map(Value::from).unwrap_or(Value::Null),
            other => other.clone(),
        };
    }
    if let Some(d) = obj.get("doubleValue") {
        return d.clone();
    }
    if let Some(b) = obj.get("booleanValue") {
        return b.clone();
    }
    if let Some(r) = obj.get("referenceValue") {
        return r.clone();
    }
    if let Some(arr) = obj.get("arrayValue") {
        let values = arr
            .get("values")
            .and_then(Value::as_array)
            .map(|vs| vs.iter().map(decode_value).collect())
            .unwrap_or_default();
        return Value::Array(values);
    }
    if let Some(map) = obj.get("mapValue") {
        let fields = map
            .get("fields")
            .and_then(Value::as_object)
            .map(|m| m.iter().map(|(k, v)| (k.clone(), decode_value(v))).collect())
            .unwrap_or_default();
        return Value::Object(fields);
    }
    Value::Null
}

/// 普通 JSON 值 -> Firestore 类型化值
pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => json!({
            "arrayValue": { "values": items.iter().map(encode_value).collect::<Vec<_>>() }
        }),
        Value::Object(map) => {
            let fields: Map<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), encode_value(v)))
                .collect();
            json!({ "mapValue": { "fields": fields } })
        }
    }
}
