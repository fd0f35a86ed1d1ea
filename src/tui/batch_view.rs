//! TUI for a batch run with progress, working proxies and the run log

use crate::batch::{RunEvent, RunHandle, RunReport, RunState, ResultRecord};
use crate::proxy::parser::save_lines;
use crate::Result;
use anyhow::Context;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Gauge, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use tokio::time::Duration;

/// Maximum number of log lines kept for display
const MAX_LOG_LINES: usize = 200;

/// Batch run TUI application state
pub struct BatchApp {
    /// The run being watched; taken when the run is joined
    handle: Option<RunHandle>,
    /// Output file for working proxies
    good_output: Option<PathBuf>,
    /// File rewritten with the remaining list on every update
    remaining_output: Option<PathBuf>,
    /// Number of candidates in the run
    total: usize,
    percent: u8,
    progress_status: String,
    /// Working proxies in the order they were found
    rows: Vec<ResultRecord>,
    log: VecDeque<String>,
    remaining: usize,
    list_state: ListState,
    status_message: String,
    state: RunState,
    should_quit: bool,
}

impl BatchApp {
    pub fn new(handle: RunHandle, total: usize, remaining: usize) -> Self {
        Self {
            handle: Some(handle),
            good_output: None,
            remaining_output: None,
            total,
            percent: 0,
            progress_status: "Starting".to_string(),
            rows: Vec::new(),
            log: VecDeque::new(),
            remaining,
            list_state: ListState::default(),
            status_message: "Testing proxies... 'c' cancels, 'q' quits.".to_string(),
            state: RunState::Running,
            should_quit: false,
        }
    }

    pub fn with_good_output(mut self, path: Option<PathBuf>) -> Self {
        self.good_output = path;
        self
    }

    pub fn with_remaining_output(mut self, path: Option<PathBuf>) -> Self {
        self.remaining_output = path;
        self
    }

    /// Run the TUI until the user quits, then return the run's report
    pub async fn run(&mut self) -> Result<RunReport> {
        // Setup terminal
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let result = self.run_app(&mut terminal).await;

        // Restore terminal
        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;

        result?;

        let handle = self
            .handle
            .take()
            .context("batch run was already joined")?;
        // Quitting mid-run cancels; the in-flight probe still has to finish.
        handle.cancel();
        Ok(handle.join().await?)
    }

    async fn run_app<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<()> {
        let mut good_file = self
            .good_output
            .as_ref()
            .map(|p| {
                OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(p)
                    .with_context(|| format!("Failed to create {:?}", p))
            })
            .transpose()?;

        loop {
            terminal.draw(|f| self.ui(f))?;

            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_input(key.code);
                        if self.should_quit {
                            break;
                        }
                    }
                }
            }

            // Drain whatever the run has produced since the last frame
            while let Some(event) = self.handle.as_mut().and_then(RunHandle::try_recv) {
                self.apply(event, good_file.as_mut())?;
            }
        }

        Ok(())
    }

    fn apply(&mut self, event: RunEvent, good_file: Option<&mut File>) -> Result<()> {
        match event {
            RunEvent::Log(line) => {
                self.log.push_back(line);
                if self.log.len() > MAX_LOG_LINES {
                    self.log.pop_front();
                }
            }
            RunEvent::Row(record) => {
                if let Some(file) = good_file {
                    writeln!(file, "{}", record.candidate.to_full_string())?;
                    file.flush()?;
                }
                self.rows.push(record);
                if self.list_state.selected().is_none() {
                    self.list_state.select(Some(0));
                }
            }
            RunEvent::Progress { percent, status } => {
                self.percent = percent;
                self.progress_status = status;
            }
            RunEvent::Remaining(lines) => {
                self.remaining = lines.len();
                if let Some(path) = &self.remaining_output {
                    save_lines(&lines, path)?;
                }
            }
            RunEvent::Finished(state) => {
                self.state = state;
                self.status_message = format!(
                    "Run {}. Working: {} | Remaining: {} | Press 'q' to quit",
                    state,
                    self.rows.len(),
                    self.remaining
                );
            }
        }
        Ok(())
    }

    fn handle_input(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.should_quit = true;
            }
            KeyCode::Char('c') => {
                if self.state == RunState::Running {
                    if let Some(handle) = &self.handle {
                        handle.cancel();
                    }
                    self.status_message =
                        "Cancelling after the current proxy...".to_string();
                }
            }
            KeyCode::Down => {
                let i = match self.list_state.selected() {
                    Some(i) if i + 1 < self.rows.len() => i + 1,
                    _ => 0,
                };
                self.list_state.select(Some(i));
            }
            KeyCode::Up => {
                let i = match self.list_state.selected() {
                    Some(0) | None => self.rows.len().saturating_sub(1),
                    Some(i) => i - 1,
                };
                self.list_state.select(Some(i));
            }
            _ => {}
        }
    }

    fn ui(&mut self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([
                Constraint::Length(3), // Title
                Constraint::Length(3), // Progress bar
                Constraint::Min(0),    // Results and log
                Constraint::Length(3), // Status bar
            ])
            .split(f.size());

        let title = Paragraph::new("Proxy Timezone Check")
            .style(Style::default().fg(Color::Cyan))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL));
        f.render_widget(title, chunks[0]);

        let gauge = Gauge::default()
            .block(Block::default().borders(Borders::ALL).title("Progress"))
            .gauge_style(Style::default().fg(Color::Green).bg(Color::Black))
            .percent(u16::from(self.percent.min(100)))
            .label(format!("{} ({} candidates)", self.progress_status, self.total));
        f.render_widget(gauge, chunks[1]);

        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(chunks[2]);

        Self::render_rows(f, body[0], &self.rows, &mut self.list_state);
        Self::render_log(f, body[1], &self.log);

        let status = Paragraph::new(format!(
            "{} | Remaining lines: {}",
            self.status_message, self.remaining
        ))
        .style(if self.state.is_terminal() {
            Style::default().fg(Color::Green)
        } else {
            Style::default().fg(Color::Yellow)
        })
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Status"));
        f.render_widget(status, chunks[3]);
    }

    fn render_rows(f: &mut Frame, area: Rect, rows: &[ResultRecord], state: &mut ListState) {
        let items: Vec<ListItem> = rows
            .iter()
            .map(|record| {
                let content = match (record.geo(), record.matched()) {
                    (Some(geo), Some(matched)) => format!(
                        "{} | {}ms | {} | {} | {} -> {}",
                        record.proxy_display,
                        record.latency_ms,
                        geo.ip,
                        geo.country,
                        geo.timezone,
                        matched
                    ),
                    _ => record.proxy_display.clone(),
                };
                ListItem::new(content).style(Style::default().fg(Color::Green))
            })
            .collect();

        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!("Working Proxies ({})", rows.len()))
                    .border_style(
                        Style::default()
                            .fg(Color::Cyan)
                            .add_modifier(Modifier::BOLD),
                    ),
            )
            .highlight_style(Style::default().bg(Color::DarkGray))
            .highlight_symbol(">> ");

        f.render_stateful_widget(list, area, state);
    }

    fn render_log(f: &mut Frame, area: Rect, log: &VecDeque<String>) {
        // Newest lines at the bottom, clipped to what fits
        let visible = area.height.saturating_sub(2) as usize;
        let skip = log.len().saturating_sub(visible);
        let items: Vec<ListItem> = log
            .iter()
            .skip(skip)
            .map(|line| {
                let color = if line.contains(" - ERROR(") {
                    Color::Red
                } else if line.contains(" - OK(") {
                    Color::Green
                } else {
                    Color::Gray
                };
                ListItem::new(line.as_str()).style(Style::default().fg(color))
            })
            .collect();

        let list = List::new(items).block(Block::default().borders(Borders::ALL).title("Log"));
        f.render_widget(list, area);
    }
}
