pub mod action;
pub mod server;
pub mod watch;

use colored::{ColoredString, Colorize};
use skyflow_cloud::{ActionCommand, ActionStatus, PollTick, STATUS_OFF, STATUS_RUNNING};

/// サーバー状態の色付け (表の列幅に合わせて詰めてから着色)
pub fn colorize_server_status(status: &str, width: usize) -> ColoredString {
    let text = format!("{:<width$}", status, width = width);
    match status {
        STATUS_RUNNING => text.green(),
        STATUS_OFF => text.dimmed(),
        _ => text.yellow(),
    }
}

/// アクション状態の色付け
pub fn colorize_action_status(status: ActionStatus, width: usize) -> ColoredString {
    let text = format!("{:<width$}", status.to_string(), width = width);
    match status {
        ActionStatus::Running => text.yellow(),
        ActionStatus::Success => text.green(),
        ActionStatus::Error => text.red(),
    }
}

/// コマンドの表示名
pub fn command_label(command: ActionCommand) -> &'static str {
    match command {
        ActionCommand::StartServer => "起動",
        ActionCommand::StopServer => "停止",
        ActionCommand::CreateServer => "作成",
    }
}

/// ポーリング1回ごとの進捗行
pub fn print_tick(tick: &PollTick) {
    let line = format!("  [{:>3}] {}: {}", tick.attempt, tick.server, tick.message);
    if tick.consecutive_errors > 0 {
        println!("{}", line.yellow());
    } else {
        println!("{}", line.dimmed());
    }
}
