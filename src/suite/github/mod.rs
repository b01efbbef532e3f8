//! GitHub 模块
//!
//! 单次请求的 REST 调用：用户、仓库、分支、PR、评论，以及 PR 的变更操作

pub mod api;
pub mod dao;
pub mod models;
pub mod service;
pub mod types;

// 重新导出主要类型
pub use api::GithubApi;
pub use dao::GithubDao;
pub use models::{LocalBranch, LocalPrComment, LocalPullRequest, LocalRepository};
pub use service::GithubSyncer;
pub use types::{GithubUser, MergeResult};
