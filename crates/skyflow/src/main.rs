mod commands;
mod context;
mod tui;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "sky")]
#[command(about = "クラウドサーバーの起動・停止を、待たずに見届ける。", long_about = None)]
struct Cli {
    /// 使用するプロバイダー (既定: sakura-cloud)
    #[arg(long, global = true, env = "SKYFLOW_PROVIDER")]
    provider: Option<String>,

    /// ゾーン (例: is1a, tk1b)
    #[arg(long, global = true, env = "SKYFLOW_ZONE")]
    zone: Option<String>,

    /// アクションストアのパス (既定: ~/.config/skyflow/actions.json)
    #[arg(long, global = true, env = "SKYFLOW_STORE")]
    store: Option<PathBuf>,

    /// usacloud バイナリのパス
    #[arg(long, global = true, env = "SKYFLOW_USACLOUD", hide = true)]
    usacloud: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// サーバーを操作
    #[command(subcommand)]
    Server(ServerCommands),
    /// 記録されたアクションを管理
    Action {
        /// 未完了のアクションをすべて再開して完了を待つ
        #[arg(long)]
        resume: bool,
        #[command(subcommand)]
        command: Option<ActionCommands>,
    },
    /// 複数の操作を並行して見守るダッシュボード
    Watch,
    /// バージョン情報を表示
    Version,
}

/// サーバー操作のサブコマンド
#[derive(Subcommand)]
enum ServerCommands {
    /// サーバーの一覧を表示
    List,
    /// サーバーを起動
    Start {
        /// サーバーID
        id: String,
        /// 進行中のアクションがあっても実行する
        #[arg(short, long)]
        force: bool,
        /// 完了を待たずに終了（後で `sky action resume` で追跡）
        #[arg(long)]
        no_wait: bool,
    },
    /// サーバーを停止
    Stop {
        /// サーバーID
        id: String,
        /// 進行中のアクションがあっても実行する
        #[arg(short, long)]
        force: bool,
        /// 完了を待たずに終了（後で `sky action resume` で追跡）
        #[arg(long)]
        no_wait: bool,
    },
    /// サーバーを作成して起動を待つ
    Create {
        /// サーバー名
        #[arg(long)]
        name: String,
        /// プラン (例: 2core-4gb)
        #[arg(long)]
        plan: Option<String>,
        /// ディスクサイズ (GB)
        #[arg(long)]
        disk_size: Option<i32>,
        /// OS種別 (例: ubuntu)
        #[arg(long)]
        os: Option<String>,
        /// タグ (複数指定可)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
}

/// アクション管理のサブコマンド
#[derive(Subcommand)]
enum ActionCommands {
    /// 未完了のアクションを表示
    List {
        /// 完了済みを含む最近のアクションを表示
        #[arg(short, long)]
        all: bool,
        /// 表示件数 (--all と併用)
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
    /// 未完了のアクションをすべて再開して完了を待つ
    Resume,
    /// 古い完了済みアクションを削除
    Prune {
        /// この日数より前に終わったアクションを削除
        #[arg(long, default_value = "7")]
        days: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Versionコマンドは設定ファイル不要
    if matches!(cli.command, Commands::Version) {
        println!("skyflow {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // ダッシュボードは端末を占有するので、ログはファイルに出力
    if matches!(cli.command, Commands::Watch) {
        init_file_logging();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_writer(std::io::stderr)
            .init();
    }

    let overrides = context::Overrides {
        provider: cli.provider,
        zone: cli.zone,
        store: cli.store,
        usacloud: cli.usacloud,
    };
    let ctx = context::AppContext::load(overrides).await?;

    // Ctrl-C で進行中の待機を中断（レコードは running のまま残る）
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    match cli.command {
        Commands::Server(server_cmd) => match server_cmd {
            ServerCommands::List => {
                commands::server::handle_list(&ctx).await?;
            }
            ServerCommands::Start {
                id,
                force,
                no_wait,
            } => {
                commands::server::handle_power(
                    &ctx,
                    skyflow_cloud::ActionCommand::StartServer,
                    &id,
                    force,
                    no_wait,
                    &cancel,
                )
                .await?;
            }
            ServerCommands::Stop {
                id,
                force,
                no_wait,
            } => {
                commands::server::handle_power(
                    &ctx,
                    skyflow_cloud::ActionCommand::StopServer,
                    &id,
                    force,
                    no_wait,
                    &cancel,
                )
                .await?;
            }
            ServerCommands::Create {
                name,
                plan,
                disk_size,
                os,
                tags,
            } => {
                let request = skyflow_cloud::CreateServerRequest {
                    name,
                    plan,
                    disk_size,
                    os,
                    tags,
                };
                commands::server::handle_create(&ctx, &request, &cancel).await?;
            }
        },
        Commands::Action { resume, command } => match (resume, command) {
            (true, None) | (_, Some(ActionCommands::Resume)) => {
                commands::action::handle_resume(&ctx, &cancel).await?;
            }
            (true, Some(_)) => {
                eprintln!(
                    "{} --resume はサブコマンドと同時に指定できません",
                    "Error:".red().bold()
                );
                std::process::exit(2);
            }
            (false, None) => {
                commands::action::handle_list(&ctx, false, 0).await?;
            }
            (false, Some(ActionCommands::List { all, limit })) => {
                commands::action::handle_list(&ctx, all, limit).await?;
            }
            (false, Some(ActionCommands::Prune { days })) => {
                commands::action::handle_prune(&ctx, days).await?;
            }
        },
        Commands::Watch => {
            commands::watch::handle(&ctx).await?;
        }
        // 処理済み
        Commands::Version => {}
    }

    Ok(())
}

/// `sky watch` 用のログ設定 (~/.config/skyflow/watch.log)
fn init_file_logging() {
    use std::fs::OpenOptions;

    let log_file = skyflow_config::watch_log_path()
        .ok()
        .and_then(|path| OpenOptions::new().create(true).append(true).open(path).ok());

    if let Some(file) = log_file {
        tracing_subscriber::fmt()
            .with_writer(file)
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive(tracing::Level::INFO.into()),
            )
            .with_ansi(false)
            .init();
    }
}
