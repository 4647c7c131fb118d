use std::collections::VecDeque;
use std::io;
use std::time::{Duration, Instant, SystemTime};
use std::{
    fmt,
    sync::{Arc, Mutex},
    thread,
};

use crossterm::ExecutableCommand;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use miette::IntoDiagnostic;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

use crate::app::{
    BatchResult, ImportResult, InfoResult, ListResult, PreviewEntry, PreviewResult, ProgressEvent,
    ProgressSink, ProgressSinkKind,
};
use crate::error::TomoError;
use crate::store::Store;

const EVENTS_MAX: usize = 6;
const LOGS_MAX: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Operational,
    Logs,
    Help,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Resolve,
    Read,
    Transfer,
    Register,
    Store,
}

impl Phase {
    fn label(self) -> &'static str {
        match self {
            Phase::Resolve => "Resolve",
            Phase::Read => "Read",
            Phase::Transfer => "Transfer",
            Phase::Register => "Register",
            Phase::Store => "Store",
        }
    }
}

#[derive(Debug, Clone, Default)]
struct StoreSummary {
    runs: usize,
    bytes: u64,
}

#[derive(Debug)]
struct AppState {
    status: String,
    phase: Phase,
    files_done: usize,
    files_total: usize,
    events: VecDeque<String>,
    logs: VecDeque<String>,
    view: View,
    store_summary: StoreSummary,
    started: Instant,
    elapsed: Option<Duration>,
    active: bool,
    finished: bool,
}

pub struct Tui {
    kind: ProgressSinkKind,
    state: Arc<Mutex<AppState>>,
    log_scroll: u16,
}

struct TuiProgress {
    state: Arc<Mutex<AppState>>,
}

impl ProgressSink for TuiProgress {
    fn event(&self, event: ProgressEvent) {
        if let Ok(mut state) = self.state.lock() {
            let message = event.message.trim().to_string();
            if let Some((phase, payload)) = parse_phase(&message) {
                state.phase = phase;
                state.status = payload.to_string();
                if let Some((done, total)) = parse_file_progress(payload) {
                    state.files_done = done;
                    state.files_total = total;
                }
            } else {
                state.status = message.clone();
            }
            if event.elapsed.is_some() {
                state.elapsed = event.elapsed;
            }

            push_event(&mut state.events, message.clone());
            push_log(&mut state.logs, format!("[{}] {message}", timestamp()));
        }
    }
}

impl Tui {
    pub fn new(kind: ProgressSinkKind) -> Self {
        Self {
            kind,
            state: Arc::new(Mutex::new(AppState {
                status: "ready".to_string(),
                phase: Phase::Resolve,
                files_done: 0,
                files_total: 0,
                events: VecDeque::new(),
                logs: VecDeque::new(),
                view: View::Operational,
                store_summary: compute_store_summary().unwrap_or_default(),
                started: Instant::now(),
                elapsed: None,
                active: false,
                finished: false,
            })),
            log_scroll: 0,
        }
    }

    pub fn run<F, R>(&mut self, f: F) -> miette::Result<R>
    where
        F: FnOnce(&dyn ProgressSink) -> Result<R, TomoError> + Send + 'static,
        R: Send + 'static,
    {
        self.set_active(true);

        let mut stdout = io::stdout();
        enable_raw_mode().into_diagnostic()?;
        stdout.execute(EnterAlternateScreen).into_diagnostic()?;

        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).into_diagnostic()?;
        terminal.clear().into_diagnostic()?;

        let (tx, rx) = std::sync::mpsc::channel();
        let sink = TuiProgress {
            state: self.state.clone(),
        };
        let handle = thread::spawn(move || tx.send(f(&sink)));

        let mut tick = 0usize;
        loop {
            if let Ok(state) = self.state.lock() {
                terminal
                    .draw(|frame| draw_ui(frame, self, &state, tick))
                    .into_diagnostic()?;
            }

            if let Ok(result) = rx.try_recv() {
                self.set_active(false);
                leave_screen()?;
                handle.join().ok();
                return result.map_err(miette::Report::new);
            }

            if event::poll(Duration::from_millis(120)).into_diagnostic()?
                && let Event::Key(key) = event::read().into_diagnostic()?
                && self.handle_key(key)
            {
                break;
            }

            tick = tick.wrapping_add(1);
        }

        self.set_active(false);
        leave_screen()?;
        Err(miette::Report::msg("aborted"))
    }

    pub fn finish_import(&mut self, result: &ImportResult) -> miette::Result<()> {
        print_import_summary(result);
        Ok(())
    }

    pub fn finish_batch(&mut self, result: &BatchResult) -> miette::Result<()> {
        for run in &result.runs {
            print_import_summary(run);
        }
        Ok(())
    }

    pub fn finish_preview(&mut self, result: &PreviewResult) -> miette::Result<()> {
        println!("{CYAN}{} files match {}{RESET}", result.files.len(), result.pattern);
        for file in &result.files {
            println!("  {}", preview_line(file));
        }
        for series in &result.series {
            println!("{GREEN}tilt series {}: {} files{RESET}", series.ts_id, series.files);
        }
        print_warnings(&result.warnings);
        Ok(())
    }

    pub fn finish_list(&mut self, result: &ListResult) -> miette::Result<()> {
        if result.runs.is_empty() {
            println!("{YELLOW}no import runs{RESET}");
        }
        for run in &result.runs {
            let output = run.output.as_deref().unwrap_or("no output");
            println!(
                "{CYAN}{}{RESET} {} {} ({output}, {}) {}",
                run.run_id, run.kind, run.pattern, run.size, run.created_at
            );
        }
        Ok(())
    }

    pub fn finish_info(&mut self, result: &InfoResult) -> miette::Result<()> {
        for line in &result.summary {
            println!("{GREEN}{line}{RESET}");
        }
        for line in &result.methods {
            println!("{line}");
        }
        for line in &result.items {
            println!("  {line}");
        }
        print_warnings(&result.manifest.warnings);
        Ok(())
    }

    pub fn finish_clear(&mut self) -> miette::Result<()> {
        if let Ok(mut state) = self.state.lock() {
            state.store_summary = compute_store_summary().unwrap_or_default();
        }
        println!("{GREEN}project store cleared{RESET}");
        Ok(())
    }

    pub fn confirm_clear(&mut self) -> miette::Result<bool> {
        let mut stdout = io::stdout();
        enable_raw_mode().into_diagnostic()?;
        stdout.execute(EnterAlternateScreen).into_diagnostic()?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).into_diagnostic()?;

        let confirmed = loop {
            terminal
                .draw(|frame| {
                    let block = Block::default().borders(Borders::ALL).title("Confirm");
                    let text = Paragraph::new(vec![
                        Line::from("Remove every import run in this project?"),
                        Line::from("Press y to confirm, n to cancel."),
                    ])
                    .alignment(Alignment::Center)
                    .block(block);
                    frame.render_widget(text, frame.area());
                })
                .into_diagnostic()?;

            if event::poll(Duration::from_millis(100)).into_diagnostic()?
                && let Event::Key(key) = event::read().into_diagnostic()?
            {
                match key.code {
                    KeyCode::Char('y') | KeyCode::Char('Y') => break true,
                    KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => break false,
                    _ => {}
                }
            }
        };

        leave_screen()?;
        Ok(confirmed)
    }

    fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.kind != KeyEventKind::Press {
            return false;
        }
        match key.code {
            KeyCode::F(1) | KeyCode::Char('?') => self.set_view(View::Help),
            KeyCode::F(4) | KeyCode::Char('l') => self.set_view(View::Logs),
            KeyCode::Tab => self.set_view(View::Operational),
            KeyCode::PageUp => self.log_scroll = self.log_scroll.saturating_add(5),
            KeyCode::PageDown => self.log_scroll = self.log_scroll.saturating_sub(5),
            // Imports are not interrupted halfway; q and Esc only work once idle.
            KeyCode::Char('q') | KeyCode::Esc => return !self.is_active(),
            _ => {}
        }
        false
    }

    fn set_view(&self, view: View) {
        if let Ok(mut state) = self.state.lock() {
            state.view = view;
        }
    }

    fn is_active(&self) -> bool {
        self.state.lock().map(|state| state.active).unwrap_or(false)
    }

    fn set_active(&self, active: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.active = active;
            state.finished = !active;
            if active {
                state.started = Instant::now();
                state.elapsed = None;
                state.phase = Phase::Resolve;
                state.files_done = 0;
                state.files_total = 0;
            }
        }
    }
}

fn leave_screen() -> miette::Result<()> {
    disable_raw_mode().into_diagnostic()?;
    let mut stdout = io::stdout();
    stdout.execute(LeaveAlternateScreen).into_diagnostic()?;
    Ok(())
}

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const RESET: &str = "\x1b[0m";

fn print_import_summary(result: &ImportResult) {
    println!("{CYAN}tomo-import {}{RESET}", result.run_id());
    if result.summary.is_empty() {
        println!("{YELLOW}no output registered{RESET}");
    }
    for line in &result.summary {
        println!("{GREEN}{line}{RESET}");
    }
    for line in &result.methods {
        println!("{line}");
    }
    print_warnings(&result.manifest.warnings);
}

fn preview_line(file: &PreviewEntry) -> String {
    let mut line = format!("#{} {}", file.id, file.path);
    if let Some(format) = file.format {
        line.push_str(&format!(" [{format}]"));
    }
    if let Some(dimensions) = file.dimensions {
        line.push_str(&format!(" {dimensions}"));
    }
    if let Some(count) = file.coordinates {
        line.push_str(&format!(" {count} coordinates"));
    }
    line
}

fn print_warnings(warnings: &[String]) {
    for warning in warnings {
        println!("{YELLOW}warning: {warning}{RESET}");
    }
}

fn draw_ui(frame: &mut ratatui::Frame, tui: &Tui, state: &AppState, tick: usize) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(8), Constraint::Length(2)])
        .split(frame.area());

    frame.render_widget(draw_header(state, tui.kind, tick), chunks[0]);
    match state.view {
        View::Operational => {
            let main = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
                .split(chunks[1]);
            frame.render_widget(draw_status_panel(state), main[0]);
            frame.render_widget(draw_logs_view(state, tui.log_scroll), main[1]);
        }
        View::Logs => frame.render_widget(draw_logs_view(state, tui.log_scroll), chunks[1]),
        View::Help => frame.render_widget(draw_help(), chunks[1]),
    }
    let footer = Paragraph::new(Line::from(Span::styled(
        "F1 help  F4 logs  Tab status  PgUp/PgDn scroll  Esc quit",
        Style::default().fg(Color::DarkGray),
    )))
    .block(Block::default().borders(Borders::TOP));
    frame.render_widget(footer, chunks[2]);
}

fn draw_help() -> Paragraph<'static> {
    let block = Block::default().borders(Borders::ALL).title("Help");
    let lines = vec![
        Line::from("F1/? help   F4/l logs   Tab back to status"),
        Line::from("Commands: import tomograms|subtomograms <PATTERN>, list, info <RUN>, clear"),
        Line::from("Patterns: * ? [...] and # for digit ids, e.g. /data/ts_##.mrc"),
    ];
    Paragraph::new(lines).block(block).wrap(Wrap { trim: true })
}

fn draw_header(state: &AppState, kind: ProgressSinkKind, tick: usize) -> Paragraph<'static> {
    let hb = if tick % 2 == 0 { "*" } else { " " };
    let op_label = match kind {
        ProgressSinkKind::Import => "Import",
        ProgressSinkKind::Preview => "Preview",
        ProgressSinkKind::List => "List",
        ProgressSinkKind::Info => "Info",
        ProgressSinkKind::Clear => "Clear",
    };
    let header_line = Line::from(vec![
        Span::styled(
            "TOMO-IMPORT",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(env!("CARGO_PKG_VERSION"), Style::default().fg(Color::Gray)),
        Span::raw("   Op: "),
        Span::styled(op_label, Style::default().fg(Color::Cyan)),
        Span::raw("   "),
        Span::styled(hb, Style::default().fg(Color::Green)),
    ]);
    let store_line = Line::from(Span::styled(
        format!(
            "Project store: {} runs · {}",
            state.store_summary.runs,
            bytes_to_human(state.store_summary.bytes)
        ),
        Style::default().fg(Color::Gray),
    ));
    Paragraph::new(vec![header_line, store_line])
        .alignment(Alignment::Left)
        .block(Block::default().borders(Borders::BOTTOM))
}

fn draw_status_panel(state: &AppState) -> Paragraph<'static> {
    let progress = progress_percent(state);
    let phase_color = if state.active {
        Color::Cyan
    } else if state.finished {
        Color::Green
    } else {
        Color::Yellow
    };
    let elapsed = state
        .elapsed
        .unwrap_or_else(|| state.started.elapsed())
        .as_millis();
    let mut lines = vec![
        Line::from(Span::styled(
            "STATUS / PROGRESS",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(vec![
            Span::styled("Phase: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("{:<8} ", state.phase.label()),
                Style::default().fg(phase_color),
            ),
            Span::raw(progress_bar(progress)),
            Span::raw(format!(" {progress:>3}%")),
        ]),
        Line::from(vec![
            Span::styled("Files: ", Style::default().fg(Color::Gray)),
            Span::raw(format!("{}/{}", state.files_done, state.files_total)),
            Span::styled("   Elapsed: ", Style::default().fg(Color::Gray)),
            Span::raw(format!("{elapsed} ms")),
        ]),
        Line::from(vec![
            Span::styled("Status: ", Style::default().fg(Color::Gray)),
            Span::raw(state.status.clone()),
        ]),
        Line::from(Span::styled(
            "Recent events:",
            Style::default().fg(Color::Gray),
        )),
    ];
    for event in state.events.iter().rev().take(3) {
        lines.push(Line::from(format!("- {event}")));
    }

    Paragraph::new(lines)
        .block(Block::default().borders(Borders::RIGHT))
        .wrap(Wrap { trim: true })
}

fn draw_logs_view(state: &AppState, scroll: u16) -> Paragraph<'static> {
    let total = state.logs.len();
    let visible = 9usize;
    let start = total.saturating_sub(scroll as usize + visible);
    let mut lines = Vec::with_capacity(visible + 1);
    lines.push(Line::from(Span::styled(
        "LOGS (scrollable)",
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    )));
    for line in state.logs.iter().skip(start).take(visible) {
        lines.push(Line::from(line.clone()));
    }
    Paragraph::new(lines).wrap(Wrap { trim: true })
}

fn progress_percent(state: &AppState) -> u8 {
    if state.finished {
        return 100;
    }
    match state.phase {
        Phase::Resolve => 0,
        Phase::Store => 95,
        _ if state.files_total > 0 => {
            (state.files_done.saturating_sub(1) * 90 / state.files_total + 5).min(95) as u8
        }
        _ => 5,
    }
}

fn progress_bar(percent: u8) -> String {
    let total = 10;
    let filled = (percent as usize * total) / 100;
    let mut out = String::from("[");
    for i in 0..total {
        out.push(if i < filled { '#' } else { '.' });
    }
    out.push(']');
    out
}

fn parse_phase(message: &str) -> Option<(Phase, &str)> {
    let rest = message.strip_prefix("phase=")?;
    let (name, payload) = rest.split_once(';')?;
    let phase = match name {
        "Resolve" => Phase::Resolve,
        "Read" => Phase::Read,
        "Transfer" => Phase::Transfer,
        "Register" => Phase::Register,
        "Store" => Phase::Store,
        _ => return None,
    };
    Some((phase, payload.trim()))
}

fn parse_file_progress(payload: &str) -> Option<(usize, usize)> {
    let counts = payload.strip_prefix("file ")?.split_whitespace().next()?;
    let (done, total) = counts.split_once('/')?;
    Some((done.parse().ok()?, total.parse().ok()?))
}

fn push_event(buffer: &mut VecDeque<String>, item: String) {
    buffer.push_back(item);
    while buffer.len() > EVENTS_MAX {
        buffer.pop_front();
    }
}

fn push_log(buffer: &mut VecDeque<String>, item: String) {
    buffer.push_back(item);
    while buffer.len() > LOGS_MAX {
        buffer.pop_front();
    }
}

fn timestamp() -> String {
    let secs = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs();
    let mins = (secs / 60) % 60;
    let hours = (secs / 3600) % 24;
    let seconds = secs % 60;
    format!("{hours:02}:{mins:02}:{seconds:02}")
}

fn compute_store_summary() -> Option<StoreSummary> {
    let store = Store::new().ok()?;
    let runs = store.run_ids().ok()?.len();
    let bytes = dir_size(store.project_root().as_std_path()).unwrap_or(0);
    Some(StoreSummary { runs, bytes })
}

fn dir_size(path: &std::path::Path) -> Option<u64> {
    let mut total = 0u64;
    let mut stack = vec![path.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries = std::fs::read_dir(&path).ok()?;
        for entry in entries.flatten() {
            let p = entry.path();
            if p.is_dir() {
                stack.push(p);
            } else if let Ok(meta) = entry.metadata() {
                total = total.saturating_add(meta.len());
            }
        }
    }
    Some(total)
}

fn bytes_to_human(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    let value = bytes as f64;
    if value >= GB {
        format!("{:.1} GB", value / GB)
    } else if value >= MB {
        format!("{:.1} MB", value / MB)
    } else if value >= KB {
        format!("{:.1} KB", value / KB)
    } else {
        format!("{bytes} B")
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}
