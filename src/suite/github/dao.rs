//! GitHub 数据访问层（DAO）
//!
//! 仓库、PR、评论按 id upsert；分支没有 id，按仓库整体替换。

use crate::suite::github::models::{LocalBranch, LocalPrComment, LocalPullRequest, LocalRepository};
use anyhow::{Context, Result};
use chrono::DateTime;
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info};

/// GitHub DAO（基于 sqlx）
#[derive(Clone)]
pub struct GithubDao {
    db: Pool<Sqlite>,
}

impl GithubDao {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    /// 初始化数据库表结构
    pub async fn init_db(&self) -> Result<()> {
        Self::init_db_with_connection(&self.db).await
    }

    /// 使用共享连接初始化数据库表结构（静态方法）
    pub async fn init_db_with_connection(db: &Pool<Sqlite>) -> Result<()> {
        info!("[GithubDAO/DB] 初始化 GitHub 数据库表结构");

        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS github_repositories (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                url TEXT,
                is_owned_by_self INTEGER NOT NULL DEFAULT 0,
                viewer_uid TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS github_branches (
                repo_id INTEGER NOT NULL,
                name TEXT,
                url TEXT
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_github_branches_repo
                ON github_branches(repo_id)
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS github_pull_requests (
                id INTEGER PRIMARY KEY,
                repo_id INTEGER NOT NULL,
                number INTEGER NOT NULL,
                title TEXT NOT NULL,
                body TEXT NOT NULL,
                creator TEXT NOT NULL,
                state TEXT,
                comments_url TEXT NOT NULL,
                created_at INTEGER
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS github_pr_comments (
                id INTEGER PRIMARY KEY,
                pull_request_id INTEGER NOT NULL,
                body TEXT NOT NULL,
                creator TEXT NOT NULL,
                updated_at INTEGER
            )
            "#,
        ];
        for sql in statements {
            sqlx::query(sql)
                .execute(db)
                .await
                .context("创建 GitHub 表失败")?;
        }
        Ok(())
    }

    /// 批量插入或更新仓库
    pub async fn upsert_repositories(&self, repos: &[LocalRepository]) -> Result<()> {
        let mut tx = self.db.begin().await.context("开启事务失败")?;
        for repo in repos {
            sqlx::query(
                r#"
                INSERT INTO github_repositories (id, name, url, is_owned_by_self, viewer_uid)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    url = excluded.url,
                    is_owned_by_self = excluded.is_owned_by_self,
                    viewer_uid = excluded.viewer_uid
                "#,
            )
            .bind(repo.id)
            .bind(&repo.name)
            .bind(&repo.url)
            .bind(repo.is_owned_by_self as i64)
            .bind(&repo.viewer_uid)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("插入仓库失败: {}", repo.id))?;
        }
        tx.commit().await.context("提交事务失败")?;
        debug!("[GithubDAO] 已保存 {} 个仓库", repos.len());
        Ok(())
    }

    /// 获取某用户拉取过的仓库
    pub async fn get_repositories(&self, viewer_uid: &str) -> Result<Vec<LocalRepository>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, url, is_owned_by_self, viewer_uid
            FROM github_repositories
            WHERE viewer_uid = ?
            ORDER BY name ASC
            "#,
        )
        .bind(viewer_uid)
        .fetch_all(&self.db)
        .await
        .context("查询仓库列表失败")?;
        Ok(rows.iter().map(Self::row_to_repository).collect())
    }

    /// 按 API 地址查找仓库
    pub async fn find_repository_by_url(&self, url: &str) -> Result<Option<LocalRepository>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, url, is_owned_by_self, viewer_uid
            FROM github_repositories
            WHERE url = ?
            "#,
        )
        .bind(url)
        .fetch_optional(&self.db)
        .await
        .context("查询仓库失败")?;
        Ok(row.as_ref().map(Self::row_to_repository))
    }

    /// 用新的分支列表整体替换仓库的分支
    pub async fn replace_branches(&self, repo_id: i64, branches: &[LocalBranch]) -> Result<()> {
        let mut tx = self.db.begin().await.context("开启事务失败")?;
        sqlx::query("DELETE FROM github_branches WHERE repo_id = ?")
            .bind(repo_id)
            .execute(&mut *tx)
            .await
            .context("清空分支失败")?;
        for branch in branches {
            sqlx::query("INSERT INTO github_branches (repo_id, name, url) VALUES (?, ?, ?)")
                .bind(repo_id)
                .bind(&branch.name)
                .bind(&branch.url)
                .execute(&mut *tx)
                .await
                .context("插入分支失败")?;
        }
        tx.commit().await.context("提交事务失败")?;
        Ok(())
    }

    pub async fn get_branches(&self, repo_id: i64) -> Result<Vec<LocalBranch>> {
        let rows = sqlx::query(
            "SELECT repo_id, name, url FROM github_branches WHERE repo_id = ? ORDER BY rowid ASC",
        )
        .bind(repo_id)
        .fetch_all(&self.db)
        .await
        .context("查询分支失败")?;
        Ok(rows
            .iter()
            .map(|m| LocalBranch {
                repo_id: m.get("repo_id"),
                name: m.get("name"),
                url: m.get("url"),
            })
            .collect())
    }

    /// 批量插入或更新 PR
    pub async fn upsert_pull_requests(&self, prs: &[LocalPullRequest]) -> Result<()> {
        let mut tx = self.db.begin().await.context("开启事务失败")?;
        for pr in prs {
            sqlx::query(
                r#"
                INSERT INTO github_pull_requests
                    (id, repo_id, number, title, body, creator, state, comments_url, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    repo_id = excluded.repo_id,
                    number = excluded.number,
                    title = excluded.title,
                    body = excluded.body,
                    creator = excluded.creator,
                    state = COALESCE(excluded.state, github_pull_requests.state),
                    comments_url = excluded.comments_url,
                    created_at = COALESCE(excluded.created_at, github_pull_requests.created_at)
                "#,
            )
            .bind(pr.id)
            .bind(pr.repo_id)
            .bind(pr.number)
            .bind(&pr.title)
            .bind(&pr.body)
            .bind(&pr.creator)
            .bind(&pr.state)
            .bind(&pr.comments_url)
            .bind(pr.created_at.map(|t| t.timestamp_millis()))
            .execute(&mut *tx)
            .await
            .with_context(|| format!("插入PR失败: {}", pr.id))?;
        }
        tx.commit().await.context("提交事务失败")?;
        debug!("[GithubDAO] 已保存 {} 个PR", prs.len());
        Ok(())
    }

    pub async fn get_pull_requests(&self, repo_id: i64) -> Result<Vec<LocalPullRequest>> {
        let rows = sqlx::query(
            r#"
            SELECT id, repo_id, number, title, body, creator, state, comments_url, created_at
            FROM github_pull_requests
            WHERE repo_id = ?
            ORDER BY number DESC
            "#,
        )
        .bind(repo_id)
        .fetch_all(&self.db)
        .await
        .context("查询PR列表失败")?;
        Ok(rows
            .iter()
            .map(|m| {
                let created_at: Option<i64> = m.get("created_at");
                LocalPullRequest {
                    id: m.get("id"),
                    repo_id: m.get("repo_id"),
                    number: m.get("number"),
                    title: m.get("title"),
                    body: m.get("body"),
                    creator: m.get("creator"),
                    state: m.get("state"),
                    comments_url: m.get("comments_url"),
                    created_at: created_at.and_then(DateTime::from_timestamp_millis),
                }
            })
            .collect())
    }

    /// 批量插入或更新评论
    pub async fn upsert_comments(&self, comments: &[LocalPrComment]) -> Result<()> {
        let mut tx = self.db.begin().await.context("开启事务失败")?;
        for comment in comments {
            sqlx::query(
                r#"
                INSERT INTO github_pr_comments (id, pull_request_id, body, creator, updated_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    pull_request_id = excluded.pull_request_id,
                    body = excluded.body,
                    creator = excluded.creator,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(comment.id)
            .bind(comment.pull_request_id)
            .bind(&comment.body)
            .bind(&comment.creator)
            .bind(comment.updated_at.map(|t| t.timestamp_millis()))
            .execute(&mut *tx)
            .await
            .with_context(|| format!("插入评论失败: {}", comment.id))?;
        }
        tx.commit().await.context("提交事务失败")?;
        Ok(())
    }

    pub async fn get_comments(&self, pull_request_id: i64) -> Result<Vec<LocalPrComment>> {
        let rows = sqlx::query(
            r#"
            SELECT id, pull_request_id, body, creator, updated_at
            FROM github_pr_comments
            WHERE pull_request_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(pull_request_id)
        .fetch_all(&self.db)
        .await
        .context("查询评论失败")?;
        Ok(rows
            .iter()
            .map(|m| {
                let updated_at: Option<i64> = m.get("updated_at");
                LocalPrComment {
                    id: m.get("id"),
                    pull_request_id: m.get("pull_request_id"),
                    body: m.get("body"),
                    creator: m.get("creator"),
                    updated_at: updated_at.and_then(DateTime::from_timestamp_millis),
                }
            })
            .collect())
    }

    fn row_to_repository(row: &SqliteRow) -> LocalRepository {
        let is_owned_by_self: i64 = row.get("is_owned_by_self");
        LocalRepository {
            id: row.get("id"),
            name: row.get("name"),
            url: row.get("url"),
            is_owned_by_self: is_owned_by_self != 0,
            viewer_uid: row.get("viewer_uid"),
        }
    }
}
