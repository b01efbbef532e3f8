//! GitHub 同步服务层
//!
//! 每个操作都是一次请求：拉取 / 变更远端资源，映射成本地模型后落库。
//! 远端缺少 id 的记录（id 为 -1）照常返回，但不写入本地。

use crate::suite::config::GithubConfig;
use crate::suite::error::{Result, SyncError};
use crate::suite::github::api::GithubApi;
use crate::suite::github::dao::GithubDao;
use crate::suite::github::models::{
    LocalBranch, LocalPrComment, LocalPullRequest, LocalRepository, MISSING_ID,
};
use crate::suite::github::types::{CreatePullRequestReq, GithubUser, MergeResult};
use sqlx::{Pool, Sqlite};
use tracing::{info, warn};

/// GitHub 同步器
pub struct GithubSyncer {
    api: GithubApi,
    dao: GithubDao,
}

impl GithubSyncer {
    /// 使用共享连接池创建同步器
    pub fn new(config: &GithubConfig, db: Pool<Sqlite>) -> Result<Self> {
        info!("[GithubSync] 创建 GitHub 同步器，API: {}", config.api_base_url);
        Ok(Self::with_api(GithubApi::from_config(config)?, db))
    }

    pub fn with_api(api: GithubApi, db: Pool<Sqlite>) -> Self {
        Self {
            api,
            dao: GithubDao::new(db),
        }
    }

    fn repo_url(repo: &LocalRepository) -> Result<&str> {
        repo.url
            .as_deref()
            .ok_or_else(|| SyncError::IllegalArgument(format!("仓库 {} 没有 API 地址", repo.name)))
    }

    fn persistable<T: Clone>(items: &[T], id_of: impl Fn(&T) -> i64, kind: &str) -> Vec<T> {
        let kept: Vec<T> = items
            .iter()
            .filter(|item| id_of(item) != MISSING_ID)
            .cloned()
            .collect();
        if kept.len() < items.len() {
            warn!(
                "[GithubSync] {} 个{}缺少 id，未写入本地",
                items.len() - kept.len(),
                kind
            );
        }
        kept
    }

    /// 获取用户信息（不落库）
    pub async fn get_user_info(&self, uid: &str) -> Result<GithubUser> {
        self.api.get_user_info(uid).await
    }

    /// 拉取并保存用户的仓库
    pub async fn get_user_repos(&self, uid: &str) -> Result<Vec<LocalRepository>> {
        let repos: Vec<LocalRepository> = self
            .api
            .get_user_repos(uid)
            .await?
            .into_iter()
            .map(|resp| LocalRepository::from_resp(resp, uid))
            .collect();

        self.dao
            .upsert_repositories(&Self::persistable(&repos, |r| r.id, "仓库"))
            .await
            .map_err(SyncError::local)?;
        Ok(repos)
    }

    /// 拉取并保存仓库的分支（整体替换）
    pub async fn get_branches(&self, repo: &LocalRepository) -> Result<Vec<LocalBranch>> {
        let repo_url = Self::repo_url(repo)?;
        let branches: Vec<LocalBranch> = self
            .api
            .get_branches(repo_url)
            .await?
            .into_iter()
            .map(|resp| LocalBranch::from_resp(resp, repo.id, repo_url))
            .collect();

        if repo.id != MISSING_ID {
            self.dao
                .replace_branches(repo.id, &branches)
                .await
                .map_err(SyncError::local)?;
        }
        Ok(branches)
    }

    /// 拉取并保存仓库的 PR
    pub async fn get_pull_requests(&self, repo: &LocalRepository) -> Result<Vec<LocalPullRequest>> {
        let repo_url = Self::repo_url(repo)?;
        let prs: Vec<LocalPullRequest> = self
            .api
            .get_pull_requests(repo_url)
            .await?
            .into_iter()
            .map(|resp| LocalPullRequest::from_resp(resp, repo.id, repo_url))
            .collect();

        self.dao
            .upsert_pull_requests(&Self::persistable(&prs, |p| p.id, "PR"))
            .await
            .map_err(SyncError::local)?;
        Ok(prs)
    }

    /// 拉取并保存 PR 的评论
    pub async fn get_pr_comments(&self, pr: &LocalPullRequest) -> Result<Vec<LocalPrComment>> {
        let comments: Vec<LocalPrComment> = self
            .api
            .get_pr_comments(&pr.comments_url)
            .await?
            .into_iter()
            .map(|resp| LocalPrComment::from_resp(resp, pr.id))
            .collect();

        self.dao
            .upsert_comments(&Self::persistable(&comments, |c| c.id, "评论"))
            .await
            .map_err(SyncError::local)?;
        Ok(comments)
    }

    /// 在 PR 下发表评论
    pub async fn create_comment(&self, pr: &LocalPullRequest, body: &str) -> Result<LocalPrComment> {
        if body.is_empty() {
            return Err(SyncError::IllegalArgument("评论内容为空".to_string()));
        }
        let resp = self.api.create_comment(&pr.comments_url, body).await?;
        let comment = LocalPrComment::from_resp(resp, pr.id);
        self.dao
            .upsert_comments(&Self::persistable(std::slice::from_ref(&comment), |c| c.id, "评论"))
            .await
            .map_err(SyncError::local)?;
        info!("[GithubSync] ✅ 已在 PR #{} 下发表评论", pr.number);
        Ok(comment)
    }

    /// 创建 PR
    pub async fn create_pull_request(
        &self,
        repo: &LocalRepository,
        title: &str,
        head: &str,
        base: &str,
        body: Option<&str>,
    ) -> Result<LocalPullRequest> {
        let repo_url = Self::repo_url(repo)?;
        let req = CreatePullRequestReq {
            title,
            head,
            base,
            body,
        };
        let resp = self.api.create_pull_request(repo_url, &req).await?;
        let pr = LocalPullRequest::from_resp(resp, repo.id, repo_url);
        self.dao
            .upsert_pull_requests(&Self::persistable(std::slice::from_ref(&pr), |p| p.id, "PR"))
            .await
            .map_err(SyncError::local)?;
        info!("[GithubSync] ✅ 已创建 PR #{}: {}", pr.number, pr.title);
        Ok(pr)
    }

    /// 合并 PR；成功后本地状态记为 merged
    pub async fn merge_pull_request(
        &self,
        repo: &LocalRepository,
        pr: &LocalPullRequest,
        commit_title: Option<&str>,
    ) -> Result<MergeResult> {
        let repo_url = Self::repo_url(repo)?;
        let result = self
            .api
            .merge_pull_request(repo_url, pr.number, commit_title)
            .await?;
        if result.merged && pr.id != MISSING_ID {
            let mut merged = pr.clone();
            merged.state = Some("merged".to_string());
            self.dao
                .upsert_pull_requests(&[merged])
                .await
                .map_err(SyncError::local)?;
        }
        Ok(result)
    }

    /// 关闭 PR
    pub async fn close_pull_request(
        &self,
        repo: &LocalRepository,
        pr: &LocalPullRequest,
    ) -> Result<LocalPullRequest> {
        let repo_url = Self::repo_url(repo)?;
        let resp = self.api.close_pull_request(repo_url, pr.number).await?;
        let closed = LocalPullRequest::from_resp(resp, repo.id, repo_url);
        self.dao
            .upsert_pull_requests(&Self::persistable(std::slice::from_ref(&closed), |p| p.id, "PR"))
            .await
            .map_err(SyncError::local)?;
        Ok(closed)
    }

    /// 本地查找仓库，找不到时构造一个只有地址的临时仓库
    pub async fn repository_for_url(&self, url: &str) -> Result<LocalRepository> {
        let found = self
            .dao
            .find_repository_by_url(url)
            .await
            .map_err(SyncError::local)?;
        Ok(found.unwrap_or_else(|| LocalRepository::from_url(url)))
    }

    pub async fn get_local_repositories(&self, uid: &str) -> Result<Vec<LocalRepository>> {
        self.dao.get_repositories(uid).await.map_err(SyncError::local)
    }

    pub async fn get_local_branches(&self, repo_id: i64) -> Result<Vec<LocalBranch>> {
        self.dao.get_branches(repo_id).await.map_err(SyncError::local)
    }

    pub async fn get_local_pull_requests(&self, repo_id: i64) -> Result<Vec<LocalPullRequest>> {
        self.dao
            .get_pull_requests(repo_id)
            .await
            .map_err(SyncError::local)
    }

    pub async fn get_local_comments(&self, pull_request_id: i64) -> Result<Vec<LocalPrComment>> {
        self.dao
            .get_comments(pull_request_id)
            .await
            .map_err(SyncError::local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::db::create_memory_pool;
    use crate::suite::testing::MockServer;

    async fn syncer(server: &MockServer) -> GithubSyncer {
        let config = GithubConfig {
            api_base_url: server.base_url.clone(),
            ..Default::default()
        };
        GithubSyncer::new(&config, create_memory_pool().await.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_repos_are_mapped_and_persisted() {
        let server = MockServer::start(vec![(
            "GET /user/42/repos",
            200,
            r#"[
                {"id": 1, "name": "mine", "url": "https://api.github.com/repos/me/mine", "owner": {"id": 42}},
                {"id": 2, "name": "fork", "url": "https://api.github.com/repos/you/fork", "owner": {"id": 7}},
                {"name": "ghost"}
            ]"#,
        )])
        .await;
        let syncer = syncer(&server).await;

        let repos = syncer.get_user_repos("42").await.unwrap();
        assert_eq!(repos.len(), 3);
        assert!(repos[0].is_owned_by_self);
        assert!(!repos[1].is_owned_by_self);
        assert_eq!(repos[2].id, -1);

        // 缺少 id 的仓库不落库
        let local = syncer.get_local_repositories("42").await.unwrap();
        assert_eq!(local.len(), 2);
    }

    #[tokio::test]
    async fn test_mistyped_repo_fields_keep_rest_of_list() {
        let server = MockServer::start(vec![(
            "GET /user/42/repos",
            200,
            r#"[
                {"id": 1, "name": "a", "url": "https://api.github.com/repos/me/a", "owner": {"id": 42}},
                {"id": "2", "name": "bad", "url": 5, "owner": "me"}
            ]"#,
        )])
        .await;
        let syncer = syncer(&server).await;

        let repos = syncer.get_user_repos("42").await.unwrap();
        assert_eq!(repos.len(), 2);
        assert_eq!(repos[0].id, 1);
        assert_eq!(repos[1].id, -1);
        assert_eq!(repos[1].name, "bad");
        assert!(repos[1].url.is_none());
        assert!(!repos[1].is_owned_by_self);

        let local = syncer.get_local_repositories("42").await.unwrap();
        assert_eq!(local.len(), 1);
    }

    #[tokio::test]
    async fn test_branches_require_repository_url() {
        let server = MockServer::start(vec![]).await;
        let syncer = syncer(&server).await;
        let mut repo = LocalRepository::from_url("unused");
        repo.url = None;

        let err = syncer.get_branches(&repo).await.unwrap_err();
        assert!(matches!(err, SyncError::IllegalArgument(_)));
        assert!(server.requests().await.is_empty());
    }

    #[tokio::test]
    async fn test_branches_and_pull_requests_for_known_repository() {
        let server = MockServer::start(vec![
            ("GET /repos/me/mine/branches", 200, r#"[{"name":"main"},{"name":"dev"}]"#),
            (
                "GET /repos/me/mine/pulls",
                200,
                r#"[{"id": 30, "number": 3, "title": "Fix", "user": {"login": "octocat"},
                     "created_at": "2018-12-09T10:00:00Z"}]"#,
            ),
        ])
        .await;
        let syncer = syncer(&server).await;
        let repo = LocalRepository {
            id: 1,
            name: "mine".to_string(),
            url: Some(server.url("/repos/me/mine")),
            is_owned_by_self: true,
            viewer_uid: "42".to_string(),
        };

        let branches = syncer.get_branches(&repo).await.unwrap();
        assert_eq!(
            branches[0].url.as_deref(),
            Some(format!("{}/branches/main", server.url("/repos/me/mine")).as_str())
        );
        assert_eq!(syncer.get_local_branches(1).await.unwrap().len(), 2);

        let prs = syncer.get_pull_requests(&repo).await.unwrap();
        assert_eq!(prs[0].creator, "octocat");
        assert_eq!(prs[0].body, "");
        assert_eq!(
            prs[0].comments_url,
            format!("{}/issues/3/comments", server.url("/repos/me/mine"))
        );
        let local = syncer.get_local_pull_requests(1).await.unwrap();
        assert_eq!(local, prs);
    }

    #[tokio::test]
    async fn test_comment_roundtrip_through_comments_url() {
        let server = MockServer::start(vec![
            (
                "GET /repos/me/mine/issues/3/comments",
                200,
                r#"[{"id": 5, "body": "first", "user": {"login": "a"}, "updated_at": "2018-12-09T10:00:00Z"}]"#,
            ),
            (
                "POST /repos/me/mine/issues/3/comments",
                201,
                r#"{"id": 6, "body": "lgtm", "user": {"login": "b"}}"#,
            ),
        ])
        .await;
        let syncer = syncer(&server).await;
        let pr = LocalPullRequest {
            id: 30,
            repo_id: 1,
            number: 3,
            title: "Fix".to_string(),
            body: String::new(),
            creator: "octocat".to_string(),
            state: None,
            comments_url: server.url("/repos/me/mine/issues/3/comments"),
            created_at: None,
        };

        let comments = syncer.get_pr_comments(&pr).await.unwrap();
        assert_eq!(comments.len(), 1);
        let created = syncer.create_comment(&pr, "lgtm").await.unwrap();
        assert_eq!(created.creator, "b");

        let local = syncer.get_local_comments(30).await.unwrap();
        let bodies: Vec<_> = local.iter().map(|c| c.body.as_str()).collect();
        assert_eq!(bodies, vec!["first", "lgtm"]);
        let requests = server.requests().await;
        assert_eq!(requests[1].json()["body"], "lgtm");
    }

    #[tokio::test]
    async fn test_create_merge_and_close_pull_request() {
        let server = MockServer::start(vec![
            (
                "POST /repos/me/mine/pulls",
                201,
                r#"{"id": 40, "number": 4, "title": "Feature", "state": "open", "user": {"login": "me"}}"#,
            ),
            ("PUT /repos/me/mine/pulls/4/merge", 200, r#"{"sha": "abc", "merged": true}"#),
            ("PATCH /repos/me/mine/pulls/4", 200, r#"{"id": 40, "number": 4, "title": "Feature", "state": "closed"}"#),
        ])
        .await;
        let syncer = syncer(&server).await;
        let repo = LocalRepository {
            id: 1,
            name: "mine".to_string(),
            url: Some(server.url("/repos/me/mine")),
            is_owned_by_self: true,
            viewer_uid: "42".to_string(),
        };

        let pr = syncer
            .create_pull_request(&repo, "Feature", "feature", "main", None)
            .await
            .unwrap();
        assert_eq!(pr.number, 4);

        let merged = syncer.merge_pull_request(&repo, &pr, None).await.unwrap();
        assert!(merged.merged);
        let local = syncer.get_local_pull_requests(1).await.unwrap();
        assert_eq!(local[0].state.as_deref(), Some("merged"));

        let closed = syncer.close_pull_request(&repo, &pr).await.unwrap();
        assert_eq!(closed.state.as_deref(), Some("closed"));

        let requests = server.requests().await;
        let create = requests[0].json();
        assert_eq!(create["head"], "feature");
        assert_eq!(create["base"], "main");
        assert!(create.get("body").is_none());
    }

    #[tokio::test]
    async fn test_repository_for_unknown_url_is_transient() {
        let server = MockServer::start(vec![(
            "GET /repos/x/y/branches",
            200,
            r#"[{"name":"main"}]"#,
        )])
        .await;
        let syncer = syncer(&server).await;

        let repo = syncer
            .repository_for_url(&server.url("/repos/x/y"))
            .await
            .unwrap();
        assert_eq!(repo.id, -1);
        let branches = syncer.get_branches(&repo).await.unwrap();
        assert_eq!(branches.len(), 1);
        assert!(syncer.get_local_branches(-1).await.unwrap().is_empty());
    }
}
