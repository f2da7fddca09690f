use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};

use crate::actions::{Action, Button, Outbound};
use crate::control::{status_badge, Command};
use crate::detect::Status;
use crate::operator::MessageId;
use crate::targets::Target;

/// Messages kept in the log pane
const LOG_LIMIT: usize = 500;

/// Theme colors inspired by Claude Code
pub struct Theme {
    pub fg: Color,
    pub accent: Color,
    pub dim: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            fg: Color::Rgb(220, 220, 220),
            accent: Color::Rgb(217, 119, 87), // Claude orange
            dim: Color::Rgb(100, 100, 100),
            success: Color::Rgb(80, 200, 120),
            warning: Color::Rgb(255, 193, 7),
            error: Color::Rgb(220, 53, 69),
        }
    }
}

/// One line of the message log
#[derive(Debug, Clone)]
struct LogEntry {
    id: MessageId,
    text: String,
}

/// Console state: what the core last told the operator, plus the input line
pub struct App {
    /// Targets from the latest scan
    pub targets: Vec<Target>,
    /// Currently selected target index
    pub list_state: ListState,
    /// Transient footer notice (info or error)
    pub notice: Option<String>,
    pub theme: Theme,
    /// Text input buffer
    pub input_buffer: String,
    log: Vec<LogEntry>,
    screen: Option<(Option<String>, String)>,
    buttons: Vec<Button>,
    buttons_title: String,
    /// Pending action queue
    pending_actions: Vec<Action>,
}

impl App {
    pub fn new() -> Self {
        Self {
            targets: Vec::new(),
            list_state: ListState::default(),
            notice: None,
            theme: Theme::default(),
            input_buffer: String::new(),
            log: Vec::new(),
            screen: None,
            buttons: Vec::new(),
            buttons_title: String::new(),
            pending_actions: Vec::new(),
        }
    }

    /// Get the currently selected target
    pub fn selected_target(&self) -> Option<&Target> {
        self.list_state.selected().and_then(|i| self.targets.get(i))
    }

    /// Most recent message in the log
    pub fn latest_message(&self) -> Option<&str> {
        self.log.last().map(|e| e.text.as_str())
    }

    /// Take pending actions (drains the queue)
    pub fn take_pending_actions(&mut self) -> Vec<Action> {
        std::mem::take(&mut self.pending_actions)
    }

    /// Handle an action and return whether to quit
    pub fn handle_action(&mut self, action: Action) -> Result<bool> {
        match action {
            Action::KeyPress(key) => self.handle_key(key),
            Action::TargetsUpdated(targets) => {
                self.update_targets(targets);
                Ok(false)
            }
            Action::Outbound(msg) => {
                self.apply(msg);
                Ok(false)
            }
            Action::Error(msg) => {
                self.notice = Some(msg);
                Ok(false)
            }
            _ => Ok(false),
        }
    }

    fn update_targets(&mut self, targets: Vec<Target>) {
        // keep the selection on the same pane across rescans
        let selected = self.selected_target().map(|t| t.handle.clone());
        self.targets = targets;
        let index = selected
            .and_then(|h| self.targets.iter().position(|t| t.handle == h))
            .or(if self.targets.is_empty() { None } else { Some(0) });
        self.list_state.select(index);
    }

    fn apply(&mut self, msg: Outbound) {
        match msg {
            Outbound::Text { id, text } => {
                self.log.push(LogEntry { id, text });
                if self.log.len() > LOG_LIMIT {
                    let excess = self.log.len() - LOG_LIMIT;
                    self.log.drain(..excess);
                }
            }
            Outbound::Edit { id, text } => {
                if let Some(entry) = self.log.iter_mut().find(|e| e.id == id) {
                    entry.text = text;
                }
            }
            Outbound::Delete(id) => self.log.retain(|e| e.id != id),
            Outbound::Screen { frame, caption } => self.screen = Some((caption, frame)),
            Outbound::Buttons { text, buttons } => {
                self.buttons_title = text;
                self.buttons = buttons;
            }
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> Result<bool> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Ok(true);
        }
        self.notice = None;

        match key.code {
            KeyCode::Up => self.move_selection(false),
            KeyCode::Down => self.move_selection(true),
            KeyCode::F(n) => self.press_button(n),
            KeyCode::Enter => self.submit(),
            KeyCode::Esc => self.input_buffer.clear(),
            KeyCode::Backspace => {
                self.input_buffer.pop();
            }
            KeyCode::Char(c) => self.input_buffer.push(c),
            _ => {}
        }
        Ok(false)
    }

    fn submit(&mut self) {
        let line = std::mem::take(&mut self.input_buffer);
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        if line == "/copy" {
            self.pending_actions.push(Action::CopyLatest);
            return;
        }
        match Command::parse(line) {
            Ok(cmd) => self.pending_actions.push(Action::Execute(cmd)),
            Err(e) => self.notice = Some(format!("{:#}", e)),
        }
    }

    fn press_button(&mut self, n: u8) {
        let Some(button) = (n as usize).checked_sub(1).and_then(|i| self.buttons.get(i)) else {
            return;
        };
        let cmd = button.command();
        self.buttons.clear();
        self.buttons_title.clear();
        self.pending_actions.push(Action::Execute(cmd));
    }

    fn move_selection(&mut self, forward: bool) {
        if self.targets.is_empty() {
            return;
        }
        let len = self.targets.len();
        let i = match self.list_state.selected() {
            Some(i) if forward => (i + 1) % len,
            Some(i) => (i + len - 1) % len,
            None => 0,
        };
        self.list_state.select(Some(i));
        if let Some(target) = self.targets.get(i) {
            self.pending_actions
                .push(Action::Execute(Command::Select(target.handle.clone())));
        }
    }

    pub fn render(&mut self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Header
                Constraint::Min(0),    // Main content
                Constraint::Length(if self.buttons.is_empty() { 0 } else { 4 }),
                Constraint::Length(3), // Input
                Constraint::Length(1), // Footer
            ])
            .split(frame.area());

        self.render_header(frame, chunks[0]);
        self.render_main(frame, chunks[1]);
        if !self.buttons.is_empty() {
            self.render_buttons(frame, chunks[2]);
        }
        self.render_input(frame, chunks[3]);
        self.render_footer(frame, chunks[4]);
    }

    fn render_header(&self, frame: &mut Frame, area: Rect) {
        let target = self
            .selected_target()
            .map(|t| t.display_name())
            .unwrap_or_else(|| "no target".to_string());
        let title = Paragraph::new(Line::from(vec![
            Span::styled(
                " AgentRelay ",
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("│ talking to {}", target),
                Style::default().fg(self.theme.dim),
            ),
        ]))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(self.theme.dim)),
        );
        frame.render_widget(title, area);
    }

    fn render_main(&mut self, frame: &mut Frame, area: Rect) {
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Percentage(30), // Target list
                Constraint::Percentage(70), // Screen + log
            ])
            .split(area);

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
            .split(columns[1]);

        self.render_target_list(frame, columns[0]);
        self.render_screen(frame, rows[0]);
        self.render_log(frame, rows[1]);
    }

    fn status_color(&self, status: Status) -> Color {
        match status {
            Status::Thinking => self.theme.warning,
            Status::Idle => self.theme.success,
            Status::Unknown => self.theme.dim,
        }
    }

    fn render_target_list(&mut self, frame: &mut Frame, area: Rect) {
        let items: Vec<ListItem> = if self.targets.is_empty() {
            vec![ListItem::new(Line::from(Span::styled(
                "  No targets. Start the assistant in tmux.",
                Style::default().fg(self.theme.dim),
            )))]
        } else {
            self.targets
                .iter()
                .map(|target| {
                    let badge = Span::styled(
                        format!("{} ", status_badge(target.status)),
                        Style::default().fg(self.status_color(target.status)),
                    );
                    let name =
                        Span::styled(target.display_name(), Style::default().fg(self.theme.fg));
                    ListItem::new(Line::from(vec![badge, name]))
                })
                .collect()
        };

        let list = List::new(items)
            .block(
                Block::default()
                    .title(" Targets ")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(self.theme.dim)),
            )
            .highlight_style(
                Style::default()
                    .bg(Color::Rgb(50, 50, 50))
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("▶ ");

        frame.render_stateful_widget(list, area, &mut self.list_state);
    }

    fn render_screen(&self, frame: &mut Frame, area: Rect) {
        let (title, body) = match &self.screen {
            Some((caption, screen)) => {
                let title = match caption {
                    Some(c) => format!(" Screen │ {} ", c),
                    None => " Screen ".to_string(),
                };
                // show the bottom of the capture
                let height = area.height.saturating_sub(2) as usize;
                let lines: Vec<Line> = screen
                    .lines()
                    .rev()
                    .take(height)
                    .collect::<Vec<_>>()
                    .into_iter()
                    .rev()
                    .map(|l| Line::from(l.to_string()))
                    .collect();
                (title, lines)
            }
            None => (
                " Screen ".to_string(),
                vec![Line::from(Span::styled(
                    "No capture yet. /shot to take one.",
                    Style::default().fg(self.theme.dim),
                ))],
            ),
        };

        let screen = Paragraph::new(body).block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(self.theme.dim)),
        );
        frame.render_widget(screen, area);
    }

    fn render_log(&self, frame: &mut Frame, area: Rect) {
        let lines: Vec<Line> = self
            .log
            .iter()
            .flat_map(|e| e.text.lines().map(|l| Line::from(l.to_string())))
            .collect();
        let height = area.height.saturating_sub(2) as usize;
        let scroll = lines.len().saturating_sub(height) as u16;

        let log = Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .scroll((scroll, 0))
            .block(
                Block::default()
                    .title(" Messages ")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(self.theme.dim)),
            );
        frame.render_widget(log, area);
    }

    fn render_buttons(&self, frame: &mut Frame, area: Rect) {
        let mut spans = Vec::new();
        for (i, button) in self.buttons.iter().enumerate() {
            spans.push(Span::styled(
                format!(" F{} ", i + 1),
                Style::default().fg(self.theme.accent).add_modifier(Modifier::BOLD),
            ));
            spans.push(Span::styled(
                format!("{}  ", button.label()),
                Style::default().fg(self.theme.fg),
            ));
        }
        let first_line = self.buttons_title.lines().next().unwrap_or_default().to_string();
        let buttons = Paragraph::new(vec![
            Line::from(Span::styled(first_line, Style::default().fg(self.theme.dim))),
            Line::from(spans),
        ])
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(self.theme.accent)),
        );
        frame.render_widget(buttons, area);
    }

    fn render_input(&self, frame: &mut Frame, area: Rect) {
        let input = Paragraph::new(Line::from(Span::styled(
            format!("▶ {}_", self.input_buffer),
            Style::default()
                .fg(self.theme.accent)
                .add_modifier(Modifier::BOLD),
        )))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(self.theme.dim)),
        );
        frame.render_widget(input, area);
    }

    fn render_footer(&self, frame: &mut Frame, area: Rect) {
        let help_text = " Enter: send │ ↑/↓: target │ F1-F9: reply │ /keys /watch /stop /queue /shot /grab /status /copy │ Ctrl-C: quit ";

        let content = if let Some(ref msg) = self.notice {
            let style = if msg.contains("copied") {
                Style::default().fg(self.theme.success)
            } else {
                Style::default().fg(self.theme.error)
            };
            Line::from(Span::styled(format!(" {} ", msg), style))
        } else {
            Line::from(Span::styled(help_text, Style::default().fg(self.theme.dim)))
        };

        frame.render_widget(Paragraph::new(content), area);
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}
