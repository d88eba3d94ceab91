//! `sky watch` ダッシュボード
//!
//! サーバー一覧から起動・停止を何台でも並行して発行し、各操作の進捗を
//! 同じ画面で追跡する。操作は `OperationTracker` が管理し、終わった操作は
//! しばらく表示したあと消える。

use super::terminal::{Tui, restore_terminal, setup_terminal};
use crate::context::AppContext;
use crossterm::event::{Event, EventStream, KeyCode, KeyEventKind, KeyModifiers};
use futures_util::StreamExt;
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, List, ListItem, Paragraph, Row, Table, TableState},
};
use skyflow_cloud::{
    ActionCommand, CloudError, OperationState, OperationTracker, STATUS_OFF, STATUS_RUNNING,
    ServerInfo, ServerProvider, TrackerUpdate,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// サーバー一覧の自動再読込間隔
const REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// スピナーの更新間隔
const REDRAW_INTERVAL: Duration = Duration::from_millis(200);

const SPINNER_FRAMES: [&str; 4] = ["|", "/", "-", "\\"];

type RefreshResult = Result<Vec<ServerInfo>, CloudError>;

/// ステータス行の内容
#[derive(Debug, Clone, PartialEq)]
enum Notice {
    Info(String),
    Success(String),
    Error(String),
}

struct Dashboard {
    tracker: OperationTracker,
    title: String,
    servers: Vec<ServerInfo>,
    selected: usize,
    notice: Option<Notice>,
    loading: bool,
    frame: usize,
}

impl Dashboard {
    fn new(tracker: OperationTracker, title: impl Into<String>) -> Self {
        Self {
            tracker,
            title: title.into(),
            servers: Vec::new(),
            selected: 0,
            notice: None,
            loading: false,
            frame: 0,
        }
    }

    fn select_next(&mut self) {
        if self.selected + 1 < self.servers.len() {
            self.selected += 1;
        }
    }

    fn select_previous(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
        }
    }

    fn selected_server(&self) -> Option<&ServerInfo> {
        self.servers.get(self.selected)
    }

    /// 再読込を始めてよければ true (多重実行しない)
    fn begin_refresh(&mut self) -> bool {
        if self.loading {
            return false;
        }
        self.loading = true;
        true
    }

    fn apply_servers(&mut self, result: RefreshResult) {
        self.loading = false;
        match result {
            Ok(mut servers) => {
                servers.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
                // 選択中のサーバーを維持する
                let selected_id = self.selected_server().map(|s| s.id.clone());
                self.servers = servers;
                self.selected = selected_id
                    .and_then(|id| self.servers.iter().position(|s| s.id == id))
                    .unwrap_or(0)
                    .min(self.servers.len().saturating_sub(1));
            }
            Err(e) => {
                self.notice = Some(Notice::Error(format!(
                    "サーバー一覧の取得に失敗しました: {}",
                    e
                )));
            }
        }
    }

    async fn toggle_selected(&mut self) {
        let Some(server) = self.selected_server().cloned() else {
            return;
        };

        if self.tracker.is_tracking(&server.id) {
            self.notice = Some(Notice::Info(format!(
                "'{}' は操作中です",
                server.name
            )));
            return;
        }

        let label = match server.status.as_str() {
            STATUS_RUNNING => "停止",
            _ => "起動",
        };
        self.notice = Some(match self.tracker.start_toggle(&server).await {
            Some(_) => Notice::Info(format!("'{}' を{}しています...", server.name, label)),
            None => Notice::Error(format!(
                "'{}' は状態 '{}' のため操作できません",
                server.name, server.status
            )),
        });
    }

    /// トラッカーの更新を反映する。一覧の再読込が必要なら true
    fn on_update(&mut self, update: &TrackerUpdate) -> bool {
        match update {
            TrackerUpdate::Succeeded(op) => {
                let Some(operation) = self.tracker.get(*op) else {
                    return true;
                };
                let record = operation.record();
                if let Some(server) = self.servers.iter_mut().find(|s| s.id == record.server_id) {
                    server.status = record.target_status.clone();
                }
                self.notice = Some(Notice::Success(format!(
                    "✓ '{}' を{}しました",
                    record.display_name(),
                    command_label(record.command)
                )));
                true
            }
            TrackerUpdate::Failed(op, message) => {
                let name = self
                    .tracker
                    .get(*op)
                    .map(|o| o.record().display_name().to_string())
                    .unwrap_or_default();
                self.notice = Some(Notice::Error(format!("✗ '{}': {}", name, message)));
                true
            }
            TrackerUpdate::Progress(_) | TrackerUpdate::Dismissed(_) => false,
        }
    }
}

fn command_label(command: ActionCommand) -> &'static str {
    match command {
        ActionCommand::StartServer => "起動",
        ActionCommand::StopServer => "停止",
        ActionCommand::CreateServer => "作成",
    }
}

fn spawn_refresh(provider: Arc<dyn ServerProvider>, tx: mpsc::UnboundedSender<RefreshResult>) {
    tokio::spawn(async move {
        let result = provider.list_servers().await;
        let _ = tx.send(result);
    });
}

/// ダッシュボードを実行
pub async fn run_dashboard(ctx: &AppContext) -> anyhow::Result<()> {
    let tracker = OperationTracker::new(
        ctx.provider.clone(),
        ctx.store.clone(),
        ctx.tracker_config(),
    );
    let title = match &ctx.settings.zone {
        Some(zone) => format!("SkyFlow - {} ({})", ctx.provider.name(), zone),
        None => format!("SkyFlow - {}", ctx.provider.name()),
    };
    let mut dashboard = Dashboard::new(tracker, title);

    // 前回のセッションで終わらなかった操作を引き継ぐ
    match dashboard.tracker.reconcile().await {
        Ok(0) => {}
        Ok(n) => dashboard.notice = Some(Notice::Info(format!("{} 件の操作を再開しました", n))),
        Err(e) => {
            tracing::warn!("Failed to reconcile pending actions: {}", e);
            dashboard.notice = Some(Notice::Error(format!("未完了の操作を読み込めません: {}", e)));
        }
    }

    let mut terminal = setup_terminal()?;
    let result = event_loop(&mut terminal, &mut dashboard, ctx.provider.clone()).await;

    dashboard.tracker.shutdown();
    restore_terminal(&mut terminal)?;

    let active = dashboard.tracker.active_count();
    if active > 0 {
        println!(
            "{} 件の操作が進行中です。`sky action resume` で完了を待てます",
            active
        );
    }
    result
}

async fn event_loop(
    terminal: &mut Tui,
    dashboard: &mut Dashboard,
    provider: Arc<dyn ServerProvider>,
) -> anyhow::Result<()> {
    let mut events = EventStream::new();
    let (refresh_tx, mut refresh_rx) = mpsc::unbounded_channel();
    let mut refresh_timer = tokio::time::interval(REFRESH_INTERVAL);
    let mut redraw = tokio::time::interval(REDRAW_INTERVAL);

    loop {
        terminal.draw(|f| draw_ui(f, dashboard))?;

        tokio::select! {
            maybe_event = events.next() => match maybe_event {
                Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                    KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        return Ok(());
                    }
                    KeyCode::Down | KeyCode::Char('j') => dashboard.select_next(),
                    KeyCode::Up | KeyCode::Char('k') => dashboard.select_previous(),
                    KeyCode::Enter | KeyCode::Char(' ') => dashboard.toggle_selected().await,
                    KeyCode::Char('r') => {
                        if dashboard.begin_refresh() {
                            spawn_refresh(provider.clone(), refresh_tx.clone());
                        }
                    }
                    _ => {}
                },
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(()),
            },
            Some(event) = dashboard.tracker.next_event() => {
                if let Some(update) = dashboard.tracker.handle_event(event).await
                    && dashboard.on_update(&update)
                    && dashboard.begin_refresh()
                {
                    spawn_refresh(provider.clone(), refresh_tx.clone());
                }
            }
            Some(result) = refresh_rx.recv() => dashboard.apply_servers(result),
            _ = refresh_timer.tick() => {
                if dashboard.begin_refresh() {
                    spawn_refresh(provider.clone(), refresh_tx.clone());
                }
            }
            _ = redraw.tick() => {
                dashboard.frame = dashboard.frame.wrapping_add(1);
            }
        }
    }
}

fn draw_ui(frame: &mut Frame, dashboard: &Dashboard) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(8),
            Constraint::Length(3),
        ])
        .split(frame.area());

    draw_header(frame, chunks[0], dashboard);
    draw_servers(frame, chunks[1], dashboard);
    draw_operations(frame, chunks[2], dashboard);
    draw_footer(frame, chunks[3], dashboard);
}

fn draw_header(frame: &mut Frame, area: Rect, dashboard: &Dashboard) {
    let mut spans = vec![Span::styled(
        dashboard.title.as_str(),
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    )];
    if dashboard.loading {
        spans.push(Span::styled(
            format!("  {} 更新中", spinner(dashboard.frame)),
            Style::default().fg(Color::Gray),
        ));
    }

    let title = Paragraph::new(Line::from(spans))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(title, area);
}

fn draw_servers(frame: &mut Frame, area: Rect, dashboard: &Dashboard) {
    let header = Row::new(vec!["ID", "NAME", "STATUS", "IP"]).style(
        Style::default()
            .fg(Color::Gray)
            .add_modifier(Modifier::BOLD),
    );

    let rows: Vec<Row> = dashboard
        .servers
        .iter()
        .map(|server| {
            let status = if dashboard.tracker.is_tracking(&server.id) {
                Cell::from(format!("{} {}", spinner(dashboard.frame), server.status))
                    .style(Style::default().fg(Color::Yellow))
            } else {
                Cell::from(server.status.clone()).style(status_style(&server.status))
            };
            Row::new(vec![
                Cell::from(server.id.clone()),
                Cell::from(server.name.clone()),
                status,
                Cell::from(server.ip_address.clone().unwrap_or_else(|| "-".to_string())),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(16),
            Constraint::Min(16),
            Constraint::Length(16),
            Constraint::Length(16),
        ],
    )
    .header(header)
    .row_highlight_style(
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("> ")
    .block(
        Block::default()
            .title(format!("サーバー ({})", dashboard.servers.len()))
            .borders(Borders::ALL),
    );

    let mut state = TableState::default();
    if !dashboard.servers.is_empty() {
        state.select(Some(dashboard.selected));
    }
    frame.render_stateful_widget(table, area, &mut state);
}

fn draw_operations(frame: &mut Frame, area: Rect, dashboard: &Dashboard) {
    let items: Vec<ListItem> = dashboard
        .tracker
        .operations()
        .map(|op| {
            let (marker, style) = match op.state() {
                OperationState::Active => {
                    (spinner(dashboard.frame), Style::default().fg(Color::Yellow))
                }
                OperationState::Succeeded => ("✓", Style::default().fg(Color::Green)),
                OperationState::Failed => ("✗", Style::default().fg(Color::Red)),
            };
            ListItem::new(Line::from(vec![
                Span::styled(format!("{} ", marker), style),
                Span::styled(
                    format!("[{}] ", command_label(op.command())),
                    Style::default().add_modifier(Modifier::BOLD),
                ),
                Span::raw(format!("{}  ", op.record().display_name())),
                Span::styled(op.message().to_string(), style),
            ]))
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title(format!("操作 ({} 件進行中)", dashboard.tracker.active_count()))
            .borders(Borders::ALL),
    );
    frame.render_widget(list, area);
}

fn notice_line(text: &str, color: Color) -> Line<'_> {
    Line::from(Span::styled(text, Style::default().fg(color)))
}

fn draw_footer(frame: &mut Frame, area: Rect, dashboard: &Dashboard) {
    let line = match &dashboard.notice {
        Some(Notice::Info(text)) => notice_line(text, Color::Cyan),
        Some(Notice::Success(text)) => notice_line(text, Color::Green),
        Some(Notice::Error(text)) => notice_line(text, Color::Red),
        None => Line::from(Span::styled(
            "↑↓/jk: 選択 | Enter/Space: 起動・停止 | r: 再読込 | q/Esc: 終了",
            Style::default().fg(Color::Gray),
        )),
    };

    let footer = Paragraph::new(line)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(footer, area);
}

fn status_style(status: &str) -> Style {
    match status {
        STATUS_RUNNING => Style::default().fg(Color::Green),
        STATUS_OFF => Style::default().fg(Color::DarkGray),
        _ => Style::default().fg(Color::Yellow),
    }
}

fn spinner(frame: usize) -> &'static str {
    SPINNER_FRAMES[frame % SPINNER_FRAMES.len()]
}
