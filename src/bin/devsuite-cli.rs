//! Developer Suite CLI 客户端
//!
//! 非交互式 CLI：同步会话、发送消息、查看 GitHub 仓库 / 分支 / PR。
//! 配置来自 `--config` 指定的 JSON 文件，再由环境变量覆盖。

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use devsuite_sdk_core::suite::chat::ChatListener;
use devsuite_sdk_core::{ChatOutcome, DevSuiteClient, SdkConfig, Sender};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Developer Suite CLI 客户端
#[derive(Parser, Debug)]
#[command(name = "devsuite-cli")]
#[command(about = "Developer Suite CLI - 会话同步与 GitHub 资源查看", long_about = None)]
struct Args {
    /// 配置文件（JSON），缺省时只使用环境变量
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 日志级别（默认: info,devsuite_sdk_core=debug）
    #[arg(long, default_value = "info,devsuite_sdk_core=debug")]
    log_level: String,

    /// 离线模式：内存数据库 + 空的内存文档库
    #[arg(long)]
    offline: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 同步并列出用户的会话
    Chats {
        #[arg(short, long)]
        user: String,
    },
    /// 向会话发送一条文本消息
    Send {
        #[arg(long)]
        chat: String,
        #[arg(long)]
        sender: String,
        #[arg(long, default_value = "")]
        sender_name: String,
        text: String,
    },
    /// 列出 GitHub 用户的仓库
    Repos {
        #[arg(long)]
        uid: String,
    },
    /// 列出仓库分支（仓库 API 地址）
    Branches {
        #[arg(long)]
        repo_url: String,
    },
    /// 列出仓库的 PR（仓库 API 地址）
    Pulls {
        #[arg(long)]
        repo_url: String,
    },
}

/// 初始化日志（同时输出到 stdout 和文件）
fn init_logger(log_level: &str) -> Result<()> {
    use std::fs::OpenOptions;
    use std::io;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    // 优先使用环境变量 RUST_LOG
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("debug.log")
        .context("无法创建日志文件 debug.log")?;

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(true);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    info!("[CLI] 📝 日志已同时输出到控制台和文件: debug.log");
    Ok(())
}

struct CliChatListener;

#[async_trait::async_trait]
impl ChatListener for CliChatListener {
    async fn on_sync_start(&self, user_id: String) {
        info!("[CLI/Chat] 🔄 同步开始: {}", user_id);
    }

    async fn on_sync_finish(&self, report_json: String) {
        info!("[CLI/Chat] ✅ 同步完成: {}", report_json);
    }

    async fn on_sync_failed(&self, user_id: String, error: String) {
        error!("[CLI/Chat] ❌ 同步失败: {} - {}", user_id, error);
    }

    async fn on_message_sent(&self, chat_id: String, message_id: String) {
        info!("[CLI/Chat] 📤 消息已发送: {} -> {}", message_id, chat_id);
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<SdkConfig> {
    let mut config = match path {
        Some(path) => SdkConfig::from_file(path)?,
        None => SdkConfig::default(),
    };
    config.apply_env_overrides();
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(&args.log_level)?;

    let config = load_config(args.config.as_ref())?;
    info!("[CLI] 🚀 Developer Suite CLI");

    let mut client = if args.offline {
        DevSuiteClient::offline(config).await?
    } else {
        DevSuiteClient::connect(config).await?
    };
    client.set_chat_listener(Arc::new(CliChatListener));

    match args.command {
        Command::Chats { user } => {
            let (report, chats) = client.fetch_chats(&user).await?;
            for outcome in &report.outcomes {
                if let ChatOutcome::Dropped { chat_id, error } = outcome {
                    warn!("[CLI] ⚠️ 会话 {} 本次未挂载: {}", chat_id, error);
                }
            }
            info!("[CLI] 📋 会话列表（共 {} 个）:", chats.len());
            for chat in &chats {
                let name = chat.counterpart_name.as_deref().unwrap_or("(未知)");
                let avatar = client
                    .chat()
                    .get_avatar_for(&Sender::new(chat.counterpart_id.clone(), name));
                info!(
                    "[CLI]   - [{}] {} | 对方: {} | 消息: {}",
                    avatar.initials,
                    chat.chat_id,
                    name,
                    chat.messages.len()
                );
            }
        }
        Command::Send {
            chat,
            sender,
            sender_name,
            text,
        } => {
            let sender = Sender::new(sender, sender_name);
            let message_id = client.send_text(&chat, &sender, &text).await?;
            info!("[CLI] ✅ 消息ID: {}", message_id);
        }
        Command::Repos { uid } => {
            let repos = client.github().get_user_repos(&uid).await?;
            info!("[CLI] 📦 仓库列表（共 {} 个）:", repos.len());
            for repo in &repos {
                info!(
                    "[CLI]   - {} {}{}",
                    repo.id,
                    repo.name,
                    if repo.is_owned_by_self { "" } else { " (他人)" }
                );
            }
        }
        Command::Branches { repo_url } => {
            let repo = client.github().repository_for_url(&repo_url).await?;
            let branches = client.github().get_branches(&repo).await?;
            info!("[CLI] 🌿 分支列表（共 {} 个）:", branches.len());
            for branch in &branches {
                info!("[CLI]   - {}", branch.name.as_deref().unwrap_or("NA"));
            }
        }
        Command::Pulls { repo_url } => {
            let repo = client.github().repository_for_url(&repo_url).await?;
            let prs = client.github().get_pull_requests(&repo).await?;
            info!("[CLI] 🔀 PR 列表（共 {} 个）:", prs.len());
            for pr in &prs {
                info!("[CLI]   - #{} {} by {}", pr.number, pr.title, pr.creator);
            }
        }
    }

    Ok(())
}
