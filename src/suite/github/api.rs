//! GitHub HTTP API 客户端
//!
//! 每个请求都带 `Accept: application/vnd.github.v3+json`。
//! 认证优先使用 token；只配置了 client id/secret 时以 basic auth 发送。

use crate::suite::config::GithubConfig;
use crate::suite::error::{Result, SyncError};
use crate::suite::github::types::{
    BranchResp, CommentResp, CreatePullRequestReq, GithubUser, MergeResult, PullRequestResp,
    RepositoryResp,
};
use crate::suite::types::handle_http_response;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::Method;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

const GITHUB_ACCEPT: &str = "application/vnd.github.v3+json";

/// GitHub 相关的 HTTP API 客户端
pub struct GithubApi {
    client: reqwest::Client,
    api_base_url: String,
    /// (client_id, client_secret)
    basic_auth: Option<(String, String)>,
}

impl GithubApi {
    /// 创建新的 GitHub API 客户端
    ///
    /// `client` 需自行设置 Accept 等默认头，一般使用 [`GithubApi::from_config`]。
    pub fn new(client: reqwest::Client, api_base_url: String) -> Self {
        Self {
            client,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            basic_auth: None,
        }
    }

    /// 根据配置创建客户端（token 通过 default_headers 自动添加）
    pub fn from_config(config: &GithubConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_ACCEPT));
        headers.insert(USER_AGENT, HeaderValue::from_static("devsuite-sdk-core"));
        if let Some(token) = &config.token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| SyncError::IllegalArgument(format!("无效的 GitHub token: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::ClientBuilder::new()
            .default_headers(headers)
            .build()?;

        let basic_auth = match (&config.token, &config.client_id, &config.client_secret) {
            (None, Some(id), Some(secret)) => Some((id.clone(), secret.clone())),
            _ => None,
        };

        let mut api = Self::new(client, config.api_base_url.clone());
        api.basic_auth = basic_auth;
        Ok(api)
    }

    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.basic_auth {
            Some((id, secret)) => builder.basic_auth(id, Some(secret)),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
        operation_name: &str,
    ) -> Result<T> {
        debug!("[GithubAPI] {} {} ({})", method, url, operation_name);
        let mut builder = self.request(method, url);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let response = builder.send().await.map_err(|e| {
            SyncError::Transport(format!("{}: {}", operation_name, e))
        })?;
        handle_http_response(response, operation_name).await
    }

    /// 获取用户信息
    pub async fn get_user_info(&self, uid: &str) -> Result<GithubUser> {
        let url = format!("{}/user/{}", self.api_base_url, uid);
        self.send(Method::GET, &url, None, "获取用户信息").await
    }

    /// 获取用户的仓库列表
    pub async fn get_user_repos(&self, uid: &str) -> Result<Vec<RepositoryResp>> {
        let url = format!("{}/user/{}/repos", self.api_base_url, uid);
        let repos: Vec<RepositoryResp> = self.send(Method::GET, &url, None, "获取仓库列表").await?;
        info!("[GithubAPI] 用户 {} 共 {} 个仓库", uid, repos.len());
        Ok(repos)
    }

    /// 获取仓库的分支列表，`repo_url` 为仓库的 API 地址
    pub async fn get_branches(&self, repo_url: &str) -> Result<Vec<BranchResp>> {
        let url = format!("{}/branches", repo_url);
        self.send(Method::GET, &url, None, "获取分支列表").await
    }

    /// 获取仓库的 PR 列表
    pub async fn get_pull_requests(&self, repo_url: &str) -> Result<Vec<PullRequestResp>> {
        let url = format!("{}/pulls", repo_url);
        self.send(Method::GET, &url, None, "获取PR列表").await
    }

    /// 获取 PR 的评论
    pub async fn get_pr_comments(&self, comments_url: &str) -> Result<Vec<CommentResp>> {
        self.send(Method::GET, comments_url, None, "获取PR评论").await
    }

    /// 发表评论
    pub async fn create_comment(&self, comments_url: &str, body: &str) -> Result<CommentResp> {
        let payload = serde_json::json!({ "body": body });
        self.send(Method::POST, comments_url, Some(&payload), "发表评论")
            .await
    }

    /// 创建 PR
    pub async fn create_pull_request(
        &self,
        repo_url: &str,
        req: &CreatePullRequestReq<'_>,
    ) -> Result<PullRequestResp> {
        let url = format!("{}/pulls", repo_url);
        let payload = serde_json::to_value(req)
            .map_err(|e| SyncError::IllegalArgument(format!("序列化请求失败: {}", e)))?;
        self.send(Method::POST, &url, Some(&payload), "创建PR").await
    }

    /// 合并 PR
    pub async fn merge_pull_request(
        &self,
        repo_url: &str,
        number: i64,
        commit_title: Option<&str>,
    ) -> Result<MergeResult> {
        let url = format!("{}/pulls/{}/merge", repo_url, number);
        let payload = match commit_title {
            Some(title) => serde_json::json!({ "commit_title": title }),
            None => serde_json::json!({}),
        };
        self.send(Method::PUT, &url, Some(&payload), "合并PR").await
    }

    /// 关闭 PR
    pub async fn close_pull_request(&self, repo_url: &str, number: i64) -> Result<PullRequestResp> {
        let url = format!("{}/pulls/{}", repo_url, number);
        let payload = serde_json::json!({ "state": "closed" });
        self.send(Method::PATCH, &url, Some(&payload), "关闭PR").await
    }
}
