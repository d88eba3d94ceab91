use super::{colorize_server_status, command_label, print_tick};
use crate::context::AppContext;
use colored::Colorize;
use skyflow_cloud::{ActionCommand, CloudError, CreateServerRequest, PollTick};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Ctrl-C で中断した場合の終了コード
const EXIT_INTERRUPTED: i32 = 130;

pub async fn handle_list(ctx: &AppContext) -> anyhow::Result<()> {
    let servers = ctx.provider.list_servers().await?;

    if servers.is_empty() {
        println!("{}", "サーバーがありません".yellow());
        return Ok(());
    }

    // 進行中のアクションをサーバーごとに表示
    let pending: HashMap<String, ActionCommand> = ctx
        .store
        .list_pending()
        .await?
        .into_iter()
        .filter(|r| r.provider == ctx.provider.name())
        .map(|r| (r.server_id, r.command))
        .collect();

    println!(
        "{}",
        format!(
            "{:<16} {:<24} {:<14} {:<16} {}",
            "ID", "NAME", "STATUS", "IP", "ACTION"
        )
        .bold()
    );

    for server in &servers {
        let action = pending
            .get(&server.id)
            .map(|cmd| format!("{}中", command_label(*cmd)).cyan().to_string())
            .unwrap_or_default();
        println!(
            "{:<16} {:<24} {} {:<16} {}",
            server.id,
            server.name,
            colorize_server_status(&server.status, 14),
            server.ip_address.as_deref().unwrap_or("-"),
            action
        );
    }

    println!();
    println!("{} 台 ({})", servers.len(), ctx.provider.name());
    Ok(())
}

/// サーバーの起動・停止
pub async fn handle_power(
    ctx: &AppContext,
    command: ActionCommand,
    id: &str,
    force: bool,
    no_wait: bool,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let label = command_label(command);

    // 同じサーバーへの二重操作を防ぐ
    let pending = ctx.store.find_pending(ctx.provider.name(), id).await?;
    if let Some(existing) = pending.first()
        && !force
    {
        eprintln!(
            "{} サーバー '{}' には進行中のアクション #{} ({}) があります",
            "Error:".red().bold(),
            id,
            existing.id.unwrap_or_default(),
            command_label(existing.command)
        );
        eprintln!();
        eprintln!("{}", "ヒント:".yellow());
        eprintln!("  sky action resume          進行中のアクションの完了を待つ");
        eprintln!("  sky server {} {} --force   それでも実行する", command_verb(command), id);
        std::process::exit(1);
    }

    println!("{}", format!("サーバー '{}' を{}中...", id, label).green());

    let service = ctx.service();
    let (mut record, handle) = match service.initiate(command, id, None, cancel).await {
        Ok(initiated) => initiated,
        Err(CloudError::Cancelled) => {
            println!("{}", "中断しました".yellow());
            std::process::exit(EXIT_INTERRUPTED);
        }
        Err(e) => {
            return Err(anyhow::anyhow!(e).context(format!(
                "サーバー '{}' の{}リクエストに失敗しました",
                id, label
            )));
        }
    };

    let record_id = record.id.unwrap_or_default();
    if no_wait {
        println!(
            "{}",
            format!("✓ アクション #{} を記録しました", record_id).green()
        );
        println!("  完了を待つには: {}", "sky action resume".cyan());
        return Ok(());
    }

    let mut on_tick = |tick: &PollTick| print_tick(tick);
    match service
        .wait_for_completion(&mut record, &handle, cancel, &mut on_tick)
        .await
    {
        Ok(()) => {
            println!();
            println!(
                "{}",
                format!("✓ サーバー '{}' を{}しました", record.display_name(), label)
                    .green()
                    .bold()
            );
            Ok(())
        }
        Err(CloudError::Cancelled) => {
            println!();
            println!(
                "{}",
                format!(
                    "中断しました。アクション #{} は `sky action resume` で再開できます",
                    record_id
                )
                .yellow()
            );
            std::process::exit(EXIT_INTERRUPTED);
        }
        Err(e) => {
            println!();
            Err(anyhow::anyhow!(e).context(format!(
                "サーバー '{}' の{}に失敗しました (アクション #{})",
                id, label, record_id
            )))
        }
    }
}

/// サーバーを作成して起動完了を待つ
pub async fn handle_create(
    ctx: &AppContext,
    request: &CreateServerRequest,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    println!(
        "{}",
        format!("サーバー '{}' を作成中...", request.name).green()
    );

    let service = ctx.service();
    let mut on_tick = |tick: &PollTick| print_tick(tick);
    match service.create_server(request, cancel, &mut on_tick).await {
        Ok(record) => {
            println!();
            println!(
                "{}",
                format!(
                    "✓ サーバー '{}' を作成しました (ID: {})",
                    record.display_name(),
                    record.server_id
                )
                .green()
                .bold()
            );
            Ok(())
        }
        Err(CloudError::Cancelled) => {
            println!();
            println!(
                "{}",
                "中断しました。作成済みのサーバーは `sky action resume` で追跡できます".yellow()
            );
            std::process::exit(EXIT_INTERRUPTED);
        }
        Err(e) => Err(anyhow::anyhow!(e)
            .context(format!("サーバー '{}' の作成に失敗しました", request.name))),
    }
}

fn command_verb(command: ActionCommand) -> &'static str {
    match command {
        ActionCommand::StopServer => "stop",
        _ => "start",
    }
}
