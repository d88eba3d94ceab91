use crate::context::AppContext;
use crate::tui;
use colored::Colorize;

pub async fn handle(ctx: &AppContext) -> anyhow::Result<()> {
    tui::run_dashboard(ctx).await?;

    if let Ok(path) = skyflow_config::watch_log_path() {
        println!("ログ: {}", path.display().to_string().dimmed());
    }
    Ok(())
}
