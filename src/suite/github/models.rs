//! GitHub 本地模型定义
//!
//! 远端缺失的字段按固定默认值填充：id / number 为 -1，标题和作者为 "NA"。

use crate::suite::github::types::{
    BranchResp, CommentResp, PullRequestResp, RepositoryResp, UserRef,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 远端未返回 id 时使用的占位值
pub const MISSING_ID: i64 = -1;
/// 远端未返回名称 / 作者时使用的占位值
pub const MISSING_TEXT: &str = "NA";

/// 本地仓库
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalRepository {
    pub id: i64,
    pub name: String,
    /// API 地址，后续的分支 / PR 请求都以它为前缀
    pub url: Option<String>,
    #[serde(rename = "isOwnedBySelf")]
    pub is_owned_by_self: bool,
    /// 拉取这个仓库时使用的用户 ID
    #[serde(rename = "viewerUID")]
    pub viewer_uid: String,
}

impl LocalRepository {
    /// `uid` 与 owner.id 的字符串形式相同时视为自己的仓库
    pub fn from_resp(resp: RepositoryResp, uid: &str) -> Self {
        let is_owned_by_self = resp
            .owner
            .and_then(|o| o.id)
            .map(|id| id.to_string() == uid)
            .unwrap_or(false);
        Self {
            id: resp.id.unwrap_or(MISSING_ID),
            name: resp.name.unwrap_or_else(|| MISSING_TEXT.to_string()),
            url: resp.url,
            is_owned_by_self,
            viewer_uid: uid.to_string(),
        }
    }

    /// 只知道 API 地址时构造的临时仓库（不会落库）
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            id: MISSING_ID,
            name: MISSING_TEXT.to_string(),
            url: Some(url.into()),
            is_owned_by_self: false,
            viewer_uid: String::new(),
        }
    }
}

/// 本地分支
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalBranch {
    #[serde(rename = "repoID")]
    pub repo_id: i64,
    pub name: Option<String>,
    pub url: Option<String>,
}

impl LocalBranch {
    pub fn from_resp(resp: BranchResp, repo_id: i64, repo_url: &str) -> Self {
        let url = resp
            .name
            .as_ref()
            .map(|name| format!("{}/branches/{}", repo_url, name));
        Self {
            repo_id,
            name: resp.name,
            url,
        }
    }
}

/// 本地 Pull Request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalPullRequest {
    pub id: i64,
    #[serde(rename = "repoID")]
    pub repo_id: i64,
    pub number: i64,
    pub title: String,
    pub body: String,
    pub creator: String,
    pub state: Option<String>,
    #[serde(rename = "commentsURL")]
    pub comments_url: String,
    #[serde(rename = "createdAt")]
    pub created_at: Option<DateTime<Utc>>,
}

impl LocalPullRequest {
    pub fn from_resp(resp: PullRequestResp, repo_id: i64, repo_url: &str) -> Self {
        let number = resp.number.unwrap_or(MISSING_ID);
        Self {
            id: resp.id.unwrap_or(MISSING_ID),
            repo_id,
            number,
            title: resp.title.unwrap_or_else(|| MISSING_TEXT.to_string()),
            body: resp.body.unwrap_or_default(),
            creator: creator_login(resp.user),
            state: resp.state,
            comments_url: resp
                .comments_url
                .unwrap_or_else(|| format!("{}/issues/{}/comments", repo_url, number)),
            created_at: parse_github_time(resp.created_at.as_deref()),
        }
    }
}

/// 本地 PR 评论
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalPrComment {
    pub id: i64,
    #[serde(rename = "pullRequestID")]
    pub pull_request_id: i64,
    pub body: String,
    pub creator: String,
    #[serde(rename = "updatedAt")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl LocalPrComment {
    pub fn from_resp(resp: CommentResp, pull_request_id: i64) -> Self {
        Self {
            id: resp.id.unwrap_or(MISSING_ID),
            pull_request_id,
            body: resp.body.unwrap_or_default(),
            creator: creator_login(resp.user),
            updated_at: parse_github_time(resp.updated_at.as_deref()),
        }
    }
}

fn creator_login(user: Option<UserRef>) -> String {
    user.and_then(|u| u.login)
        .unwrap_or_else(|| MISSING_TEXT.to_string())
}

/// GitHub 时间格式为 RFC3339，缺失或无法解析时为空
fn parse_github_time(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_defaults_and_ownership() {
        let resp: RepositoryResp = serde_json::from_value(serde_json::json!({
            "url": "https://api.github.com/repos/a/b",
            "owner": { "id": 42 }
        }))
        .unwrap();
        let repo = LocalRepository::from_resp(resp, "42");
        assert_eq!(repo.id, -1);
        assert_eq!(repo.name, "NA");
        assert!(repo.is_owned_by_self);

        let resp: RepositoryResp =
            serde_json::from_value(serde_json::json!({ "id": 7, "name": "b", "owner": null }))
                .unwrap();
        let repo = LocalRepository::from_resp(resp, "42");
        assert!(!repo.is_owned_by_self);
        assert_eq!(repo.url, None);
    }

    #[test]
    fn test_pull_request_defaults() {
        let resp: PullRequestResp =
            serde_json::from_value(serde_json::json!({ "number": 3, "body": null })).unwrap();
        let pr = LocalPullRequest::from_resp(resp, 7, "https://api.github.com/repos/a/b");
        assert_eq!(pr.id, -1);
        assert_eq!(pr.title, "NA");
        assert_eq!(pr.body, "");
        assert_eq!(pr.creator, "NA");
        assert_eq!(
            pr.comments_url,
            "https://api.github.com/repos/a/b/issues/3/comments"
        );
        assert_eq!(pr.created_at, None);
    }

    #[test]
    fn test_comment_time_parsing() {
        let resp: CommentResp = serde_json::from_value(serde_json::json!({
            "id": 1,
            "body": "lgtm",
            "user": { "login": "octocat" },
            "updated_at": "2018-12-09T10:00:00Z"
        }))
        .unwrap();
        let comment = LocalPrComment::from_resp(resp, 9);
        assert_eq!(comment.creator, "octocat");
        assert_eq!(
            comment.updated_at.map(|t| t.timestamp()),
            Some(1_544_349_600)
        );
    }

    #[test]
    fn test_branch_url_only_when_named() {
        let named = LocalBranch::from_resp(BranchResp { name: Some("main".into()) }, 1, "u");
        assert_eq!(named.url.as_deref(), Some("u/branches/main"));
        let unnamed = LocalBranch::from_resp(BranchResp { name: None }, 1, "u");
        assert_eq!(unnamed.url, None);
    }
}
