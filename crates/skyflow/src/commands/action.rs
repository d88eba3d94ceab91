use super::{colorize_action_status, command_label, print_tick};
use crate::context::AppContext;
use colored::Colorize;
use skyflow_cloud::{ActionRecord, CloudError, PollTick};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// アクション一覧。`all` なら完了済みを含む最近の `limit` 件
pub async fn handle_list(ctx: &AppContext, all: bool, limit: usize) -> anyhow::Result<()> {
    let records = if all {
        ctx.store.list_recent(limit).await?
    } else {
        ctx.store.list_pending().await?
    };

    if records.is_empty() {
        if all {
            println!("{}", "記録されたアクションはありません".yellow());
        } else {
            println!("{}", "進行中のアクションはありません".green());
        }
        return Ok(());
    }

    println!(
        "{}",
        format!(
            "{:<6} {:<6} {:<24} {:<14} {:<9} {:>5}  {}",
            "#", "CMD", "SERVER", "PROVIDER", "STATUS", "PROG", "UPDATED"
        )
        .bold()
    );
    for record in &records {
        print_record(record);
    }

    if !all {
        println!();
        println!("完了を待つには: {}", "sky action resume".cyan());
    }
    Ok(())
}

fn print_record(record: &ActionRecord) {
    let updated = record
        .updated_at
        .with_timezone(&chrono::Local)
        .format("%Y-%m-%d %H:%M:%S");
    println!(
        "{:<6} {:<6} {:<24} {:<14} {} {:>4}%  {}",
        record.id.unwrap_or_default(),
        command_label(record.command),
        record.display_name(),
        record.provider,
        colorize_action_status(record.status, 9),
        record.progress,
        updated
    );
    if let Some(error) = &record.error {
        println!("       {}", error.red());
    }
}

/// 未完了のアクションを順に再開する
///
/// ひとつでも失敗したら非ゼロで終了する (中断は失敗に数えない)
pub async fn handle_resume(ctx: &AppContext, cancel: &CancellationToken) -> anyhow::Result<()> {
    let service = ctx.service();
    let mut on_tick = |tick: &PollTick| print_tick(tick);
    let outcomes = service.resume_pending(cancel, &mut on_tick).await?;

    if outcomes.is_empty() {
        println!("{}", "再開するアクションはありません".green());
        return Ok(());
    }

    let mut failed = 0;
    let mut interrupted = false;
    for outcome in &outcomes {
        let record = &outcome.record;
        let id = record.id.unwrap_or_default();
        let label = command_label(record.command);
        match &outcome.result {
            Ok(()) => println!(
                "{}",
                format!("✓ #{} {} '{}' 完了", id, label, record.display_name()).green()
            ),
            Err(CloudError::Cancelled) => {
                interrupted = true;
                println!(
                    "{}",
                    format!("- #{} {} '{}' 中断", id, label, record.display_name()).yellow()
                );
            }
            Err(e) => {
                failed += 1;
                println!(
                    "{}",
                    format!("✗ #{} {} '{}' 失敗: {}", id, label, record.display_name(), e).red()
                );
            }
        }
    }

    if interrupted {
        println!(
            "{}",
            "中断しました。残りのアクションは次回の `sky action resume` で再開されます".yellow()
        );
    }
    if failed > 0 {
        anyhow::bail!("{} 件のアクションが失敗しました", failed);
    }
    Ok(())
}

/// 指定日数より前に終わったアクションを削除
pub async fn handle_prune(ctx: &AppContext, days: u64) -> anyhow::Result<()> {
    let age = Duration::from_secs(days.saturating_mul(SECS_PER_DAY));
    let deleted = ctx.store.delete_older_than(age).await?;
    println!(
        "{}",
        format!("✓ {} 件のアクションを削除しました ({}日より前)", deleted, days).green()
    );
    Ok(())
}
