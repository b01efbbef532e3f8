//! SQLite 数据库工具：统一创建连接池并初始化所有表结构

use crate::suite::chat::dao::ChatDao;
use crate::suite::github::dao::GithubDao;
use anyhow::{Context, Result};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use tracing::info;

/// 创建 SQLite 连接池并初始化所有表
pub async fn create_sqlite_pool(db_url: &str) -> Result<Pool<Sqlite>> {
    info!("[DB] 连接 SQLite 数据库: {}", db_url);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .with_context(|| format!("连接SQLite数据库失败: {}", db_url))?;
    init_schema(&pool).await?;
    Ok(pool)
}

/// 创建内存数据库（离线模式和测试使用）
///
/// 内存库每个连接各自独立，因此只保留一个永不过期的连接。
pub async fn create_memory_pool() -> Result<Pool<Sqlite>> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .context("创建内存数据库失败")?;
    init_schema(&pool).await?;
    Ok(pool)
}

async fn init_schema(pool: &Pool<Sqlite>) -> Result<()> {
    ChatDao::init_db_with_connection(pool).await?;
    GithubDao::init_db_with_connection(pool).await?;
    Ok(())
}
