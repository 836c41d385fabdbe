use std::collections::VecDeque;
use std::io;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use crossterm::ExecutableCommand;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use miette::IntoDiagnostic;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState, Wrap};

use crate::app::{ProgressEvent, ProgressSink};
use crate::error::KiraError;
use crate::output::CsvOutput;
use crate::session::SessionTable;
use crate::table::{ResultTable, TableFilter};

const EVENTS_MAX: usize = 12;
const SPINNER: &[&str] = &["|", "/", "-", "\\"];
const SUMMARY_PREVIEW: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Search,
    Fetch,
    Extract,
    Done,
}

impl Phase {
    fn label(self) -> &'static str {
        match self {
            Phase::Search => "Search",
            Phase::Fetch => "Fetch",
            Phase::Extract => "Extract",
            Phase::Done => "Done",
        }
    }
}

#[derive(Debug)]
struct ProgressState {
    phase: Phase,
    status: String,
    events: VecDeque<String>,
    requests: u64,
    skipped_chunks: u64,
    started: Instant,
}

struct TuiProgress {
    state: Arc<Mutex<ProgressState>>,
}

impl ProgressSink for TuiProgress {
    fn event(&self, event: ProgressEvent) {
        if let Ok(mut state) = self.state.lock() {
            let message = event.message.trim().to_string();
            if let Some((phase, payload)) = parse_phase(&message) {
                state.phase = phase;
                state.status = payload.to_string();
            } else {
                state.status = message.clone();
            }
            if message.contains("eutils.request") {
                state.requests = state.requests.saturating_add(1);
            }
            if message.contains("skipped") {
                state.skipped_chunks = state.skipped_chunks.saturating_add(1);
            }
            state.events.push_back(message);
            while state.events.len() > EVENTS_MAX {
                state.events.pop_front();
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BrowseMode {
    Navigate,
    EditText,
}

struct Browser {
    filter: TableFilter,
    text_input: String,
    mode: BrowseMode,
    focus_column: usize,
    table_state: TableState,
    message: String,
    export_path: Utf8PathBuf,
}

pub struct Tui {
    state: Arc<Mutex<ProgressState>>,
}

impl Default for Tui {
    fn default() -> Self {
        Self::new()
    }
}

impl Tui {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ProgressState {
                phase: Phase::Search,
                status: "ready".to_string(),
                events: VecDeque::new(),
                requests: 0,
                skipped_chunks: 0,
                started: Instant::now(),
            })),
        }
    }

    pub fn run<F, R>(&mut self, f: F) -> miette::Result<R>
    where
        F: FnOnce(&dyn ProgressSink) -> Result<R, KiraError> + Send + 'static,
        R: Send + 'static,
    {
        if let Ok(mut state) = self.state.lock() {
            state.started = Instant::now();
        }
        let mut session = TerminalSession::enter()?;

        let (tx, rx) = mpsc::channel();
        let sink = TuiProgress {
            state: self.state.clone(),
        };
        let handle = thread::spawn(move || tx.send(f(&sink)));

        let mut tick = 0usize;
        loop {
            if let Ok(state) = self.state.lock() {
                session
                    .terminal
                    .draw(|frame| draw_progress(frame, &state, tick))
                    .into_diagnostic()?;
            }

            if let Some(result) = worker_result(&rx) {
                drop(session);
                handle.join().ok();
                return result;
            }

            if event::poll(Duration::from_millis(120)).into_diagnostic()? {
                if let Event::Key(key) = event::read().into_diagnostic()? {
                    if key.kind == KeyEventKind::Press
                        && matches!(key.code, KeyCode::Esc | KeyCode::Char('q'))
                    {
                        break;
                    }
                }
            }
            tick = tick.wrapping_add(1);
        }

        drop(session);
        Err(miette::Report::msg("aborted"))
    }

    pub fn browse(
        &mut self,
        session: &SessionTable,
        export_path: Utf8PathBuf,
        initial: TableFilter,
    ) -> miette::Result<TableFilter> {
        let mut browser = Browser {
            text_input: initial.text.clone().unwrap_or_default(),
            filter: initial,
            mode: BrowseMode::Navigate,
            focus_column: 0,
            table_state: TableState::default().with_selected(Some(0)),
            message: "/ search  tab column  c cycle value  r reset  e export  q quit".to_string(),
            export_path,
        };
        let mut screen = TerminalSession::enter()?;

        loop {
            let view = session.view(&browser.filter).into_diagnostic()?;
            let full = session.table().cloned().unwrap_or_default();
            screen
                .terminal
                .draw(|frame| draw_browser(frame, &mut browser, &full, &view))
                .into_diagnostic()?;

            if event::poll(Duration::from_millis(200)).into_diagnostic()? {
                if let Event::Key(key) = event::read().into_diagnostic()? {
                    if browser.handle_key(key, &full, &view) {
                        break;
                    }
                }
            }
        }

        drop(screen);
        Ok(browser.filter)
    }
}

impl Browser {
    fn handle_key(&mut self, key: KeyEvent, full: &ResultTable, view: &ResultTable) -> bool {
        if key.kind != KeyEventKind::Press {
            return false;
        }
        if self.mode == BrowseMode::EditText {
            match key.code {
                KeyCode::Enter | KeyCode::Esc => {
                    self.mode = BrowseMode::Navigate;
                }
                KeyCode::Backspace => {
                    self.text_input.pop();
                }
                KeyCode::Char(ch) => self.text_input.push(ch),
                _ => {}
            }
            let text = self.text_input.trim();
            self.filter.text = (!text.is_empty()).then(|| text.to_string());
            self.table_state.select(Some(0));
            return false;
        }

        let columns = full.derived_columns();
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Char('/') => {
                self.mode = BrowseMode::EditText;
            }
            KeyCode::Tab => {
                if !columns.is_empty() {
                    self.focus_column = (self.focus_column + 1) % columns.len();
                }
            }
            KeyCode::Char('c') => {
                if let Some(column) = columns.get(self.focus_column) {
                    let next = next_value(
                        &full.distinct_values(column),
                        self.filter.column_value(column),
                    );
                    self.filter.set_column(column, next);
                    self.table_state.select(Some(0));
                }
            }
            KeyCode::Char('r') => {
                self.filter = TableFilter::default();
                self.text_input.clear();
                self.table_state.select(Some(0));
            }
            KeyCode::Char('e') => {
                self.message = match CsvOutput::write(view, &self.export_path) {
                    Ok(()) => format!("exported {} rows to {}", view.len(), self.export_path),
                    Err(err) => format!("export failed: {err}"),
                };
            }
            KeyCode::Down => self.move_selection(1, view.len()),
            KeyCode::Up => self.move_selection(-1, view.len()),
            KeyCode::PageDown => self.move_selection(10, view.len()),
            KeyCode::PageUp => self.move_selection(-10, view.len()),
            _ => {}
        }
        false
    }

    fn move_selection(&mut self, delta: i64, len: usize) {
        if len == 0 {
            self.table_state.select(None);
            return;
        }
        let current = self.table_state.selected().unwrap_or(0) as i64;
        let next = (current + delta).clamp(0, len as i64 - 1);
        self.table_state.select(Some(next as usize));
    }
}

fn next_value(values: &[String], current: Option<&str>) -> Option<String> {
    match current {
        None => values.first().cloned(),
        Some(current) => {
            let index = values
                .iter()
                .position(|value| value.eq_ignore_ascii_case(current))?;
            values.get(index + 1).cloned()
        }
    }
}

fn parse_phase(message: &str) -> Option<(Phase, &str)> {
    let rest = message.strip_prefix("phase=")?;
    let (name, payload) = rest.split_once(';').unwrap_or((rest, ""));
    let phase = match name.trim() {
        "Search" => Phase::Search,
        "Fetch" => Phase::Fetch,
        "Extract" => Phase::Extract,
        "Done" => Phase::Done,
        _ => return None,
    };
    Some((phase, payload.trim()))
}

fn worker_result<R>(rx: &Receiver<Result<R, KiraError>>) -> Option<miette::Result<R>> {
    match rx.try_recv() {
        Ok(result) => Some(result.map_err(miette::Report::new)),
        Err(TryRecvError::Empty) => None,
        Err(TryRecvError::Disconnected) => Some(Err(miette::Report::msg(
            "fetch worker stopped without sending a result",
        ))),
    }
}

struct TerminalSession {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
}

impl TerminalSession {
    fn enter() -> miette::Result<Self> {
        enable_raw_mode().into_diagnostic()?;
        let terminal = Self::setup().inspect_err(|_| restore_terminal());
        Ok(Self {
            terminal: terminal.into_diagnostic()?,
        })
    }

    fn setup() -> io::Result<Terminal<CrosstermBackend<io::Stdout>>> {
        let mut stdout = io::stdout();
        stdout.execute(EnterAlternateScreen)?;
        let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        terminal.clear()?;
        Ok(terminal)
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        restore_terminal();
        self.terminal.show_cursor().ok();
    }
}

fn restore_terminal() {
    disable_raw_mode().ok();
    io::stdout().execute(LeaveAlternateScreen).ok();
}

fn draw_progress(frame: &mut ratatui::Frame, state: &ProgressState, tick: usize) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(5),
            Constraint::Min(4),
        ])
        .split(frame.area());

    let spinner = SPINNER[tick % SPINNER.len()];
    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            "KIRA-GEO ",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!("{spinner} {}", state.phase.label())),
    ]))
    .block(Block::default().borders(Borders::ALL));
    frame.render_widget(header, chunks[0]);

    let status = Paragraph::new(vec![
        Line::from(format!("status: {}", state.status)),
        Line::from(format!(
            "requests: {}  skipped chunks: {}  elapsed: {:.1}s",
            state.requests,
            state.skipped_chunks,
            state.started.elapsed().as_secs_f64()
        )),
        Line::from(Span::styled(
            "q/Esc to abort",
            Style::default().fg(Color::DarkGray),
        )),
    ])
    .block(Block::default().borders(Borders::ALL).title("Status"))
    .wrap(Wrap { trim: true });
    frame.render_widget(status, chunks[1]);

    let events = state
        .events
        .iter()
        .map(|event| Line::from(event.as_str()))
        .collect::<Vec<_>>();
    let events = Paragraph::new(events)
        .block(Block::default().borders(Borders::ALL).title("Events"))
        .wrap(Wrap { trim: true });
    frame.render_widget(events, chunks[2]);
}

fn draw_browser(
    frame: &mut ratatui::Frame,
    browser: &mut Browser,
    full: &ResultTable,
    view: &ResultTable,
) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Min(6),
            Constraint::Length(5),
        ])
        .split(frame.area());

    let focus = full
        .derived_columns()
        .get(browser.focus_column)
        .cloned()
        .unwrap_or_default();
    let column_filters = if browser.filter.columns.is_empty() {
        "none".to_string()
    } else {
        browser
            .filter
            .columns
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    };
    let cursor = if browser.mode == BrowseMode::EditText { "_" } else { "" };
    let filters = Paragraph::new(vec![
        Line::from(format!("search: {}{cursor}", browser.text_input)),
        Line::from(format!("column: {focus}  filters: {column_filters}")),
    ])
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("Filtered datasets ({} of {})", view.len(), full.len())),
    );
    frame.render_widget(filters, chunks[0]);

    let header = view.header();
    let widths = header
        .iter()
        .map(|name| match name.as_str() {
            "Title" | "Summary" => Constraint::Min(20),
            _ => Constraint::Length((name.len() as u16).max(8)),
        })
        .collect::<Vec<_>>();
    let rows = view.rows().iter().map(|row| {
        let values = view.row_values(row);
        let last = values.len().saturating_sub(1);
        Row::new(values.into_iter().enumerate().map(|(index, value)| {
            if index == last {
                Cell::from(preview(&value))
            } else {
                Cell::from(value)
            }
        }))
    });
    let table = Table::new(rows, widths)
        .header(
            Row::new(header.into_iter().map(Cell::from))
                .style(Style::default().add_modifier(Modifier::BOLD)),
        )
        .block(Block::default().borders(Borders::ALL))
        .row_highlight_style(Style::default().bg(Color::DarkGray));
    frame.render_stateful_widget(table, chunks[1], &mut browser.table_state);

    let selected = browser
        .table_state
        .selected()
        .and_then(|index| view.rows().get(index))
        .map(|row| row.summary.clone())
        .unwrap_or_default();
    let footer = Paragraph::new(vec![
        Line::from(Span::styled(
            browser.message.as_str(),
            Style::default().fg(Color::Yellow),
        )),
        Line::from(selected),
    ])
    .block(Block::default().borders(Borders::ALL).title("Summary"))
    .wrap(Wrap { trim: true });
    frame.render_widget(footer, chunks[2]);
}

fn preview(text: &str) -> String {
    if text.chars().count() <= SUMMARY_PREVIEW {
        return text.to_string();
    }
    let cut = text.chars().take(SUMMARY_PREVIEW).collect::<String>();
    format!("{cut}...")
}
