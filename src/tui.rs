use std::io;
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Terminal;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;
use tracing::debug;

use crate::errors::ListError;
use crate::list::{ListModel, RowKind};
use crate::types::Message;

/// Updates pushed to the UI by the background worker.
pub enum TuiEvent {
    SyncStarted,
    SyncFinished,
    Messages(Vec<Message>),
    /// Ask the user for a line of text; the answer goes back on `reply`.
    Prompt {
        text: String,
        reply: oneshot::Sender<Option<String>>,
    },
}

/// Requests from the UI to the background worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Reload,
    Archive(Vec<String>),
}

pub struct TuiState {
    pub updates: Receiver<TuiEvent>,
    pub commands: UnboundedSender<Command>,
}

enum Modal {
    None,
    Confirm {
        question: String,
        ids: Vec<String>,
    },
    Prompt {
        text: String,
        input: String,
        reply: oneshot::Sender<Option<String>>,
    },
}

pub struct App {
    updates: Option<Receiver<TuiEvent>>,
    commands: UnboundedSender<Command>,
    list: ListModel,
    cursor: usize,
    message_pane: String,
    modal: Modal,
    /// Confirm dialog set aside while a prompt is open.
    suspended: Option<Modal>,
    sync_in_progress: bool,
    spinner_index: usize,
    last_tick: Instant,
}

const SPINNER_FRAMES: [&str; 4] = ["|", "/", "-", "\\"];

impl App {
    pub fn new(updates: Option<Receiver<TuiEvent>>, commands: UnboundedSender<Command>) -> Self {
        Self {
            updates,
            commands,
            list: ListModel::new(),
            cursor: 0,
            message_pane: String::new(),
            modal: Modal::None,
            suspended: None,
            sync_in_progress: false,
            spinner_index: 0,
            last_tick: Instant::now(),
        }
    }

    pub fn list(&self) -> &ListModel {
        &self.list
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn message_pane(&self) -> &str {
        &self.message_pane
    }

    pub fn is_syncing(&self) -> bool {
        self.sync_in_progress
    }

    /// Text of the open confirm or prompt dialog, if any.
    pub fn modal_text(&self) -> Option<&str> {
        match &self.modal {
            Modal::None => None,
            Modal::Confirm { question, .. } => Some(question),
            Modal::Prompt { text, .. } => Some(text),
        }
    }

    fn move_down(&mut self) {
        let len = self.list.visible_len();
        if len == 0 {
            return;
        }
        self.cursor = (self.cursor + 1).min(len - 1);
    }

    fn move_up(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    fn clamp_cursor(&mut self) {
        self.cursor = self.cursor.min(self.list.visible_len().saturating_sub(1));
    }

    fn select(&mut self) {
        match self.list.message_at(self.cursor) {
            Ok(Some(message)) => self.message_pane = render_message(message),
            Ok(None) => {}
            Err(e) => stale_offset(e),
        }
    }

    fn toggle_check(&mut self) {
        if let Err(e) = self.list.toggle_check(self.cursor) {
            stale_offset(e);
        }
    }

    fn toggle_collapse(&mut self) {
        if let Err(e) = self.list.toggle_collapse_at(self.cursor) {
            stale_offset(e);
        }
        self.clamp_cursor();
    }

    fn request_archive(&mut self) {
        let ids: Vec<String> = self
            .list
            .selected_messages()
            .into_iter()
            .map(|m| m.id.clone())
            .collect();
        if ids.is_empty() {
            return;
        }
        self.modal = Modal::Confirm {
            question: format!(
                "Are you sure you want to archive {} messages?",
                ids.len()
            ),
            ids,
        };
    }

    fn confirm(&mut self, yes: bool) {
        let Modal::Confirm { ids, .. } = std::mem::replace(&mut self.modal, Modal::None) else {
            return;
        };
        if !yes {
            return;
        }
        if self.commands.send(Command::Archive(ids)).is_err() {
            debug!("Worker gone; archive request dropped");
        }
        self.list.deselect_all();
    }

    fn answer_prompt(&mut self, submit: bool) {
        if !matches!(self.modal, Modal::Prompt { .. }) {
            return;
        }
        let Modal::Prompt { input, reply, .. } = self.close_prompt() else {
            return;
        };
        let _ = reply.send(submit.then_some(input));
    }

    fn close_prompt(&mut self) -> Modal {
        let restored = self.suspended.take().unwrap_or(Modal::None);
        std::mem::replace(&mut self.modal, restored)
    }

    fn reload(&mut self) {
        if self.commands.send(Command::Reload).is_err() {
            debug!("Worker gone; reload request dropped");
        }
    }

    pub fn drain_updates(&mut self) {
        if let Some(rx) = self.updates.take() {
            while let Ok(event) = rx.try_recv() {
                self.apply_event(event);
            }
            self.updates = Some(rx);
        }
        self.drop_abandoned_prompt();
    }

    pub fn apply_event(&mut self, event: TuiEvent) {
        match event {
            TuiEvent::SyncStarted => {
                self.sync_in_progress = true;
            }
            TuiEvent::SyncFinished => {
                self.sync_in_progress = false;
            }
            TuiEvent::Messages(messages) => {
                self.list.rebuild(messages);
                self.clamp_cursor();
            }
            TuiEvent::Prompt { text, reply } => {
                let previous = std::mem::replace(
                    &mut self.modal,
                    Modal::Prompt {
                        text,
                        input: String::new(),
                        reply,
                    },
                );
                if let Modal::Confirm { .. } = previous {
                    debug!("Prompt opened over archive confirmation; confirmation suspended");
                    self.suspended = Some(previous);
                }
            }
        }
    }

    fn drop_abandoned_prompt(&mut self) {
        if let Modal::Prompt { reply, .. } = &self.modal {
            if reply.is_closed() {
                self.close_prompt();
            }
        }
    }

    fn advance_spinner(&mut self) {
        if self.sync_in_progress {
            self.spinner_index = (self.spinner_index + 1) % SPINNER_FRAMES.len();
        }
    }

    fn spinner_frame(&self) -> &str {
        SPINNER_FRAMES[self.spinner_index % SPINNER_FRAMES.len()]
    }

    /// Apply one key press. Returns `true` when the user asked to quit.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return true;
        }

        match &mut self.modal {
            Modal::Confirm { .. } => {
                match key.code {
                    KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => self.confirm(true),
                    KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => self.confirm(false),
                    _ => {}
                }
                return false;
            }
            Modal::Prompt { input, .. } => {
                match key.code {
                    KeyCode::Enter => self.answer_prompt(true),
                    KeyCode::Esc => self.answer_prompt(false),
                    KeyCode::Backspace => {
                        input.pop();
                    }
                    KeyCode::Char(c) => input.push(c),
                    _ => {}
                }
                return false;
            }
            Modal::None => {}
        }

        match key.code {
            KeyCode::Char('q') => return true,
            KeyCode::Down | KeyCode::Char('j') => self.move_down(),
            KeyCode::Up | KeyCode::Char('k') => self.move_up(),
            KeyCode::Enter => self.select(),
            KeyCode::Char('x') => self.toggle_check(),
            KeyCode::Char(' ') => self.toggle_collapse(),
            KeyCode::Char('y') => self.request_archive(),
            KeyCode::Char('r') => self.reload(),
            _ => {}
        }
        false
    }
}

fn stale_offset(e: ListError) {
    debug!(error = %e, "Ignoring action on stale row");
}

fn render_message(message: &Message) -> String {
    let date = message
        .received_at
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "Unknown".to_string());
    format!(
        "From: {}\nDate: {}\nSubject: {}\n\n{}",
        message.sender, date, message.subject, message.body
    )
}

pub fn run(state: TuiState) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, crossterm::terminal::EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, state);

    disable_raw_mode()?;
    crossterm::execute!(
        terminal.backend_mut(),
        crossterm::terminal::LeaveAlternateScreen
    )?;
    terminal.show_cursor()?;

    res
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    state: TuiState,
) -> Result<()> {
    let mut app = App::new(Some(state.updates), state.commands);
    let tick_rate = Duration::from_millis(200);

    loop {
        app.drain_updates();
        terminal.draw(|f| draw(f, &app))?;

        let timeout = tick_rate
            .checked_sub(app.last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && app.handle_key(key) {
                    break;
                }
            }
        }

        if app.last_tick.elapsed() >= tick_rate {
            app.last_tick = Instant::now();
            app.advance_spinner();
        }
    }

    Ok(())
}

fn draw(f: &mut ratatui::Frame, app: &App) {
    let size = f.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(5),
            Constraint::Length(3),
        ])
        .split(size);

    draw_top_bar(f, app, chunks[0]);
    draw_body(f, app, chunks[1]);
    draw_action_bar(f, chunks[2]);
    draw_modal(f, app, size);
}

fn draw_top_bar(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let title_text = if app.sync_in_progress {
        format!("Triage | Syncing {}", app.spinner_frame())
    } else {
        "Triage".to_string()
    };
    let summary = format!(
        "{} senders, {} selected",
        app.list.groups().len(),
        app.list.selected_count()
    );

    let paragraph = Paragraph::new(Line::from(summary)).block(
        Block::default()
            .borders(Borders::ALL)
            .title(Line::from(title_text)),
    );
    f.render_widget(paragraph, area);
}

fn draw_body(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);

    draw_message_pane(f, app, chunks[0]);
    draw_sender_list(f, app, chunks[1]);
}

fn draw_message_pane(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let content = if app.list.is_empty() {
        "No unread messages loaded yet."
    } else {
        app.message_pane.as_str()
    };

    let paragraph = Paragraph::new(content)
        .block(Block::default().borders(Borders::ALL).title("Message"))
        .wrap(Wrap { trim: false });

    f.render_widget(paragraph, area);
}

fn draw_sender_list(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = app
        .list
        .rows()
        .into_iter()
        .map(|row| {
            let style = match row.kind {
                RowKind::Group { .. } => Style::default().add_modifier(Modifier::BOLD),
                RowKind::Item { checked: true } => Style::default().fg(Color::Green),
                RowKind::Item { checked: false } => Style::default(),
            };
            ListItem::new(Line::from(Span::styled(row.label, style)))
        })
        .collect();

    let selected = app.list.selected_count();
    let title = if selected > 0 {
        format!(" Senders ({selected} selected) ")
    } else {
        " Senders ".to_string()
    };

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().fg(Color::Black).bg(Color::Green))
        .highlight_symbol("▶ ");

    let mut state = ListState::default();
    if app.list.visible_len() > 0 {
        state.select(Some(app.cursor));
    }
    f.render_stateful_widget(list, area, &mut state);
}

fn draw_action_bar(f: &mut ratatui::Frame, area: Rect) {
    let line = Line::from(vec![
        Span::raw("[j/k] move  "),
        Span::raw("[enter] read  "),
        Span::raw("[x] check  "),
        Span::raw("[space] expand  "),
        Span::raw("[y] archive  "),
        Span::raw("[r] reload  "),
        Span::raw("[q] quit"),
    ]);

    let paragraph =
        Paragraph::new(line).block(Block::default().borders(Borders::ALL).title("Actions"));

    f.render_widget(paragraph, area);
}

fn draw_modal(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let (title, body, color) = match &app.modal {
        Modal::None => return,
        Modal::Confirm { question, .. } => ("Confirm", format!("{question}\n\n[y] yes  [n] no"), Color::Red),
        Modal::Prompt { text, input, .. } => ("Input", format!("{text}\n\n> {input}"), Color::Green),
    };

    let popup = centered_rect(60, 30, area);
    let paragraph = Paragraph::new(body)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(title)
                .border_style(Style::default().fg(color)),
        )
        .wrap(Wrap { trim: false });

    f.render_widget(Clear, popup);
    f.render_widget(paragraph, popup);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}
