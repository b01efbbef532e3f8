//! GitHub REST 响应与请求结构
//!
//! 字段全部可选：缺失、为 null 或类型不匹配时都按缺失处理，
//! 转换成本地模型时再填默认值，单个字段出错不影响整条响应。

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// 宽松解析单个字段：类型不匹配时返回 `None`
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

/// 用户信息（`GET /user/{uid}`）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GithubUser {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub login: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub avatar_url: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub html_url: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub public_repos: Option<i64>,
}

/// 只带 id / login 的用户引用（仓库 owner、PR 和评论的作者）
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserRef {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub login: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryResp {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub owner: Option<UserRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BranchResp {
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestResp {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub number: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub body: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub user: Option<UserRef>,
    #[serde(default, deserialize_with = "lenient")]
    pub comments_url: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentResp {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub body: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub user: Option<UserRef>,
    #[serde(default, deserialize_with = "lenient")]
    pub updated_at: Option<String>,
}

/// 合并结果（`PUT {repo}/pulls/{n}/merge`）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeResult {
    #[serde(default, deserialize_with = "lenient")]
    pub sha: Option<String>,
    #[serde(default)]
    pub merged: bool,
    #[serde(default, deserialize_with = "lenient")]
    pub message: Option<String>,
}

/// 创建 PR 的请求体
#[derive(Debug, Clone, Serialize)]
pub struct CreatePullRequestReq<'a> {
    pub title: &'a str,
    pub head: &'a str,
    pub base: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<&'a str>,
}
