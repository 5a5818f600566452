use std::io::{self, Write};
use std::time::Duration;

use crossterm::{
    cursor::Show,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::{error, info};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table},
    Frame, Terminal,
};
use rust_decimal::Decimal;
use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::api::poller::PollEvent;
use crate::app::{App, LogLevel};
use crate::error::Result;
use crate::monitor::AlertKind;
use crate::ui::command::Command;

const LOG_PANE_HEIGHT: u16 = 8;

/// Raw mode and the alternate screen, undone on drop. Covers early returns and
/// panics out of the event loop as well as a normal quit.
struct TerminalGuard<W: Write> {
    out: W,
}

impl<W: Write> TerminalGuard<W> {
    fn enter(out: W) -> Result<Self> {
        enable_raw_mode()?;
        let mut guard = Self { out };
        execute!(guard.out, EnterAlternateScreen)?;
        Ok(guard)
    }
}

impl<W: Write> Drop for TerminalGuard<W> {
    fn drop(&mut self) {
        // Each step runs even if the one before it failed.
        if let Err(e) = disable_raw_mode() {
            error!("Failed to leave raw mode: {}", e);
        }
        if let Err(e) = execute!(self.out, LeaveAlternateScreen, Show) {
            error!("Failed to restore the screen: {}", e);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DashboardView {
    Prices,
    Alerts,
}

pub struct Dashboard {
    app: App,
    current_view: DashboardView,
    selected: usize,
    input: Option<String>,
    running: bool,
    poller_alive: bool,
    poll_interval: Duration,
}

impl Dashboard {
    pub fn new(app: App, poll_interval: Duration) -> Self {
        Self {
            app,
            current_view: DashboardView::Prices,
            selected: 0,
            input: None,
            running: true,
            poller_alive: true,
            poll_interval,
        }
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    /// Take over the terminal and run until the user quits. Poll results are
    /// drained from `receiver` and applied here, on the UI side only.
    pub fn run(&mut self, mut receiver: mpsc::Receiver<PollEvent>) -> Result<()> {
        let _guard = TerminalGuard::enter(io::stdout())?;
        let backend = CrosstermBackend::new(io::stdout());
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        self.event_loop(&mut terminal, &mut receiver)
    }

    fn event_loop<B: Backend>(
        &mut self,
        terminal: &mut Terminal<B>,
        receiver: &mut mpsc::Receiver<PollEvent>,
    ) -> Result<()> {
        while self.running {
            if event::poll(Duration::from_millis(100))? {
                if let Event::Key(key) = event::read()? {
                    self.handle_key_input(key);
                }
            }

            self.drain_events(receiver);

            terminal.draw(|f| self.draw(f))?;
        }
        info!("Dashboard closed");
        Ok(())
    }

    /// Apply every poll result waiting in the channel without blocking.
    pub fn drain_events(&mut self, receiver: &mut mpsc::Receiver<PollEvent>) {
        loop {
            match receiver.try_recv() {
                Ok(event) => {
                    self.app.apply(event);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if self.poller_alive {
                        error!("Polling loop exited; prices will no longer update");
                        self.poller_alive = false;
                    }
                    break;
                }
            }
        }
    }

    pub fn handle_key_input(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        if self.input.is_some() {
            self.handle_input_key(key);
            return;
        }

        match key.code {
            KeyCode::Char('q') => self.running = false,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.running = false
            }
            KeyCode::Char(':') | KeyCode::Char('/') => self.input = Some(String::new()),
            KeyCode::Char('v') => self.switch_view(DashboardView::Prices),
            KeyCode::Char('a') => self.switch_view(DashboardView::Alerts),
            KeyCode::Tab => self.switch_view(match self.current_view {
                DashboardView::Prices => DashboardView::Alerts,
                DashboardView::Alerts => DashboardView::Prices,
            }),
            KeyCode::Up => self.selected = self.selected.saturating_sub(1),
            KeyCode::Down => {
                let rows = self.row_count();
                if self.selected + 1 < rows {
                    self.selected += 1;
                }
            }
            KeyCode::Char('d') | KeyCode::Delete => self.delete_selected(),
            KeyCode::Char('e') => self.app.handle_command(Command::Export(None)),
            KeyCode::Char('c') => self.app.handle_command(Command::Clear),
            _ => (),
        }
    }

    fn handle_input_key(&mut self, key: KeyEvent) {
        let Some(buffer) = self.input.as_mut() else {
            return;
        };

        match key.code {
            KeyCode::Esc => self.input = None,
            KeyCode::Backspace => {
                buffer.pop();
            }
            KeyCode::Char(c) => buffer.push(c),
            KeyCode::Enter => {
                let line = self.input.take().unwrap_or_default();
                if !line.trim().is_empty() {
                    self.submit(&line);
                }
            }
            _ => (),
        }
    }

    fn submit(&mut self, line: &str) {
        match line.parse::<Command>() {
            Ok(command) => self.app.handle_command(command),
            Err(e) => self.app.handle_command_error(e),
        }
        if self.app.quit_requested() {
            self.running = false;
        }
        self.clamp_selection();
    }

    fn switch_view(&mut self, view: DashboardView) {
        if self.current_view != view {
            self.current_view = view;
            self.selected = 0;
        }
    }

    fn row_count(&self) -> usize {
        match self.current_view {
            DashboardView::Prices => self.app.store().len(),
            DashboardView::Alerts => self.app.store().alerts().count(),
        }
    }

    fn clamp_selection(&mut self) {
        self.selected = self.selected.min(self.row_count().saturating_sub(1));
    }

    fn delete_selected(&mut self) {
        let command = match self.current_view {
            DashboardView::Prices => self
                .app
                .store()
                .tracked()
                .nth(self.selected)
                .map(|t| Command::Untrack(t.symbol.clone())),
            DashboardView::Alerts => self
                .app
                .store()
                .alerts()
                .nth(self.selected)
                .map(|a| Command::DeleteAlert {
                    symbol: a.symbol.clone(),
                    kind: a.kind,
                }),
        };
        if let Some(command) = command {
            self.app.handle_command(command);
            self.clamp_selection();
        }
    }

    pub fn draw<B: Backend>(&self, f: &mut Frame<B>) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(5),
                Constraint::Length(LOG_PANE_HEIGHT),
                Constraint::Length(3),
            ])
            .split(f.size());

        self.render_header(f, chunks[0]);
        self.render_main_content(f, chunks[1]);
        self.render_log(f, chunks[2]);
        self.render_footer(f, chunks[3]);
    }

    fn render_header<B: Backend>(&self, f: &mut Frame<B>, area: Rect) {
        let store = self.app.store();

        let status = if !self.poller_alive {
            Span::styled("STOPPED", Style::default().fg(Color::Red))
        } else if self.app.last_error().is_some() {
            Span::styled("FETCH ERROR", Style::default().fg(Color::Red))
        } else if store.is_empty() {
            Span::styled("IDLE", Style::default().fg(Color::Yellow))
        } else {
            Span::styled("LIVE", Style::default().fg(Color::Green))
        };

        let last_update = self
            .app
            .last_update()
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "--:--:--".to_string());
        let armed = store.alerts().filter(|a| !a.fired).count();

        let mut details = format!(
            "Last update: {} | Tracking: {} | Alerts armed: {}/{} | Refresh: {}s",
            last_update,
            store.len(),
            armed,
            store.alerts().count(),
            self.poll_interval.as_secs()
        );
        if let Some(err) = self.app.last_error() {
            details.push_str(&format!(" | {}", err));
        }

        let header = Paragraph::new(Text::from(vec![
            Line::from(vec![
                Span::styled(
                    "STOCKWATCH ",
                    Style::default()
                        .fg(Color::LightCyan)
                        .add_modifier(Modifier::BOLD),
                ),
                status,
            ]),
            Line::from(Span::styled(details, Style::default().fg(Color::Gray))),
        ]))
        .block(Block::default().borders(Borders::BOTTOM));

        f.render_widget(header, area);
    }

    fn render_main_content<B: Backend>(&self, f: &mut Frame<B>, area: Rect) {
        match self.current_view {
            DashboardView::Prices => self.render_prices_view(f, area),
            DashboardView::Alerts => self.render_alerts_view(f, area),
        }
    }

    fn selected_style(&self, index: usize) -> Style {
        if index == self.selected {
            Style::default()
                .fg(Color::Black)
                .bg(Color::Yellow)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        }
    }

    fn render_prices_view<B: Backend>(&self, f: &mut Frame<B>, area: Rect) {
        let store = self.app.store();
        let block = Block::default().borders(Borders::ALL).title("Prices");

        if store.is_empty() {
            let message = Paragraph::new("No symbols tracked. Press ':' and type 'track AAPL'.")
                .block(block);
            f.render_widget(message, area);
            return;
        }

        let rows = store.tracked().enumerate().map(|(i, tracked)| {
            let observation = tracked.observation.as_ref();
            let change = observation.and_then(|o| o.percent_change);
            let change_color = match change {
                Some(c) if c < Decimal::ZERO => Color::Red,
                Some(_) => Color::Green,
                None => Color::Gray,
            };
            let armed = tracked.alerts().filter(|a| !a.fired).count();

            Row::new(vec![
                Cell::from(tracked.symbol.clone()),
                Cell::from(Self::format_price(observation.map(|o| o.price))),
                Cell::from(Self::format_price(observation.map(|o| o.prior_close))),
                Cell::from(Span::styled(
                    Self::format_change(change),
                    Style::default().fg(change_color),
                )),
                Cell::from(
                    observation
                        .map(|o| o.observed_at.format("%H:%M:%S").to_string())
                        .unwrap_or_else(|| "pending".to_string()),
                ),
                Cell::from(format!("{}/{}", armed, tracked.alerts().count())),
            ])
            .style(self.selected_style(i))
        });

        let table = Table::new(rows)
            .header(
                Row::new(vec!["Symbol", "Price", "Prior Close", "% Change", "Updated", "Alerts"])
                    .style(Style::default().add_modifier(Modifier::BOLD)),
            )
            .block(block)
            .widths(&[
                Constraint::Length(10),
                Constraint::Length(12),
                Constraint::Length(12),
                Constraint::Length(10),
                Constraint::Length(10),
                Constraint::Length(8),
            ]);

        f.render_widget(table, area);
    }

    fn render_alerts_view<B: Backend>(&self, f: &mut Frame<B>, area: Rect) {
        let store = self.app.store();
        let block = Block::default().borders(Borders::ALL).title("Alerts");

        if store.alerts().next().is_none() {
            let message = Paragraph::new("No alerts set. Example: alert AAPL price-above 150")
                .block(block);
            f.render_widget(message, area);
            return;
        }

        let rows = store.alerts().enumerate().map(|(i, alert)| {
            let observation = store.get(&alert.symbol).and_then(|t| t.observation);
            let current = match alert.kind {
                AlertKind::PriceAbove | AlertKind::PriceBelow => {
                    Self::format_price(observation.map(|o| o.price))
                }
                AlertKind::PctAbove | AlertKind::PctBelow => {
                    Self::format_change(observation.and_then(|o| o.percent_change))
                }
            };
            let threshold = if alert.kind.is_percent() {
                format!("{}%", alert.threshold)
            } else {
                alert.threshold.to_string()
            };

            let status = match alert.fired_at {
                Some(at) if alert.fired => Span::styled(
                    format!("TRIGGERED {}", at.format("%H:%M:%S")),
                    Style::default().fg(Color::Green),
                ),
                _ => Span::styled("PENDING", Style::default().fg(Color::Yellow)),
            };

            Row::new(vec![
                Cell::from(alert.symbol.clone()),
                Cell::from(format!("{} {}", alert.kind.operator(), threshold)),
                Cell::from(current),
                Cell::from(status),
            ])
            .style(self.selected_style(i))
        });

        let table = Table::new(rows)
            .header(
                Row::new(vec!["Symbol", "Condition", "Current", "Status"])
                    .style(Style::default().add_modifier(Modifier::BOLD)),
            )
            .block(block)
            .widths(&[
                Constraint::Length(10),
                Constraint::Length(15),
                Constraint::Length(12),
                Constraint::Length(20),
            ]);

        f.render_widget(table, area);
    }

    fn render_log<B: Backend>(&self, f: &mut Frame<B>, area: Rect) {
        let visible = area.height.saturating_sub(2) as usize;
        let log = self.app.log();

        let lines: Vec<Line> = log
            .iter()
            .skip(log.len().saturating_sub(visible))
            .map(|entry| {
                let color = match entry.level {
                    LogLevel::Info => Color::Gray,
                    LogLevel::Warn => Color::Yellow,
                    LogLevel::Alert => Color::LightMagenta,
                    LogLevel::Error => Color::Red,
                };
                Line::from(vec![
                    Span::styled(
                        format!("{} ", entry.at.format("%H:%M:%S")),
                        Style::default().fg(Color::DarkGray),
                    ),
                    Span::styled(entry.message.clone(), Style::default().fg(color)),
                ])
            })
            .collect();

        let pane = Paragraph::new(Text::from(lines))
            .block(Block::default().borders(Borders::ALL).title("Log"));
        f.render_widget(pane, area);
    }

    fn render_footer<B: Backend>(&self, f: &mut Frame<B>, area: Rect) {
        let block = Block::default().borders(Borders::TOP);

        match &self.input {
            Some(buffer) => {
                let prompt = Paragraph::new(Text::from(vec![Line::from(vec![
                    Span::styled(":", Style::default().fg(Color::Yellow)),
                    Span::raw(buffer.clone()),
                ])]))
                .block(block);
                f.render_widget(prompt, area);
                let x = area.x + 1 + buffer.chars().count() as u16;
                f.set_cursor(x.min(area.right().saturating_sub(1)), area.y + 1);
            }
            None => {
                let help = Paragraph::new(Text::from(vec![Line::from(Span::styled(
                    format!(
                        "q quit | : command | v prices | a alerts | d delete | e export ({}) | c clear",
                        self.app.export_path().display()
                    ),
                    Style::default().fg(Color::Gray),
                ))]))
                .block(block);
                f.render_widget(help, area);
            }
        }
    }

    fn format_price(price: Option<Decimal>) -> String {
        match price {
            Some(p) if p < Decimal::ONE => format!("{:>10.4}", p.round_dp(4)),
            Some(p) => format!("{:>10.2}", p.round_dp(2)),
            None => format!("{:>10}", "N/A"),
        }
    }

    fn format_change(change: Option<Decimal>) -> String {
        match change {
            Some(c) => {
                let sign = if c > Decimal::ZERO { "+" } else { "" };
                format!("{:>9}", format!("{}{:.2}%", sign, c.round_dp(2)))
            }
            None => format!("{:>9}", "N/A"),
        }
    }
}
