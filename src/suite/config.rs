//! SDK 配置
//!
//! 从 JSON 文件加载，再用环境变量覆盖。所有字段都有默认值，
//! 本地开发时可以零配置启动（离线模式）。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// 文档数据库（Firestore）配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DocumentStoreConfig {
    /// 项目 ID
    /// Env: `DEVSUITE_FIRESTORE_PROJECT`
    pub project_id: String,
    /// REST 基础地址
    /// Env: `DEVSUITE_FIRESTORE_URL`
    pub api_base_url: String,
    /// OAuth 访问令牌
    /// Env: `DEVSUITE_FIRESTORE_TOKEN`
    pub token: Option<String>,
}

impl Default for DocumentStoreConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            api_base_url: "https://firestore.googleapis.com/v1".to_string(),
            token: None,
        }
    }
}

/// GitHub 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GithubConfig {
    /// Env: `GITHUB_API_URL`
    pub api_base_url: String,
    /// 个人访问令牌，优先于 client id/secret
    /// Env: `GITHUB_TOKEN`
    pub token: Option<String>,
    /// Env: `GITHUB_CLIENT_ID`
    #[serde(rename = "GITHUB_CLIENT_ID", alias = "clientId")]
    pub client_id: Option<String>,
    /// Env: `GITHUB_CLIENT_SECRET`
    #[serde(rename = "GITHUB_CLIENT_SECRET", alias = "clientSecret")]
    pub client_secret: Option<String>,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.github.com".to_string(),
            token: None,
            client_id: None,
            client_secret: None,
        }
    }
}

/// SDK 总配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SdkConfig {
    /// 本地 SQLite 数据库 URL
    /// Env: `DEVSUITE_DB_URL`
    ///
    /// 例如：`sqlite://devsuite.db?mode=rwc`
    pub db_url: String,
    pub firestore: DocumentStoreConfig,
    pub github: GithubConfig,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            db_url: "sqlite://devsuite.db?mode=rwc".to_string(),
            firestore: DocumentStoreConfig::default(),
            github: GithubConfig::default(),
        }
    }
}

impl SdkConfig {
    /// 从 JSON 文件读取配置（缺失字段使用默认值）
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        let config: SdkConfig = serde_json::from_str(&text)
            .with_context(|| format!("解析配置文件失败: {}", path.display()))?;
        debug!("[Config] 已加载配置文件: {}", path.display());
        Ok(config)
    }

    /// 用进程环境变量覆盖配置
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// 用任意 key -> value 来源覆盖配置，空字符串视为未设置
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = get("DEVSUITE_DB_URL") {
            self.db_url = v;
        }
        if let Some(v) = get("DEVSUITE_FIRESTORE_PROJECT") {
            self.firestore.project_id = v;
        }
        if let Some(v) = get("DEVSUITE_FIRESTORE_URL") {
            self.firestore.api_base_url = v;
        }
        if let Some(v) = get("DEVSUITE_FIRESTORE_TOKEN") {
            self.firestore.token = Some(v);
        }
        if let Some(v) = get("GITHUB_API_URL") {
            self.github.api_base_url = v;
        }
        if let Some(v) = get("GITHUB_TOKEN") {
            self.github.token = Some(v);
        }
        if let Some(v) = get("GITHUB_CLIENT_ID") {
            self.github.client_id = Some(v);
        }
        if let Some(v) = get("GITHUB_CLIENT_SECRET") {
            self.github.client_secret = Some(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_from_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "dbUrl": "sqlite://test.db?mode=rwc",
                "firestore": {{ "projectId": "devsuite" }},
                "github": {{ "GITHUB_CLIENT_ID": "cid", "GITHUB_CLIENT_SECRET": "secret" }}
            }}"#
        )
        .unwrap();

        let config = SdkConfig::from_file(file.path()).unwrap();
        assert_eq!(config.db_url, "sqlite://test.db?mode=rwc");
        assert_eq!(config.firestore.project_id, "devsuite");
        assert_eq!(
            config.firestore.api_base_url,
            "https://firestore.googleapis.com/v1"
        );
        assert_eq!(config.github.api_base_url, "https://api.github.com");
        assert_eq!(config.github.client_id.as_deref(), Some("cid"));
        assert_eq!(config.github.client_secret.as_deref(), Some("secret"));
        assert!(config.github.token.is_none());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = SdkConfig::from_file("/nonexistent/devsuite.json").unwrap_err();
        assert!(err.to_string().contains("读取配置文件失败"));
    }

    #[test]
    fn test_overrides_ignore_empty_values() {
        let env: HashMap<&str, &str> = [
            ("GITHUB_TOKEN", "ghp_abc"),
            ("DEVSUITE_DB_URL", ""),
            ("DEVSUITE_FIRESTORE_PROJECT", "prod"),
        ]
        .into_iter()
        .collect();

        let mut config = SdkConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.github.token.as_deref(), Some("ghp_abc"));
        assert_eq!(config.db_url, "sqlite://devsuite.db?mode=rwc");
        assert_eq!(config.firestore.project_id, "prod");
    }
}
