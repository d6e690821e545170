use crate::dashboard::{InputAction, Surface};
use crossterm::{
    event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use feedmon_core::Grid;
use futures_util::{Stream, StreamExt};
use ratatui::{
    backend::CrosstermBackend,
    style::{Color, Style},
    text::Line,
    widgets::Paragraph,
    Terminal,
};
use std::io;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

/// Full-screen black-on-white view of the composed frame.
pub struct TerminalSurface {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
}

impl TerminalSurface {
    pub fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;
        terminal.hide_cursor()?;
        Ok(Self { terminal })
    }

    pub fn restore(&mut self) -> io::Result<()> {
        disable_raw_mode()?;
        execute!(self.terminal.backend_mut(), LeaveAlternateScreen)?;
        self.terminal.show_cursor()?;
        Ok(())
    }
}

impl Surface for TerminalSurface {
    fn size(&self) -> io::Result<(usize, usize)> {
        let area = self.terminal.size()?;
        Ok((usize::from(area.width), usize::from(area.height)))
    }

    fn draw(&mut self, frame: &Grid) -> io::Result<()> {
        let lines: Vec<Line> = frame.to_lines().into_iter().map(Line::from).collect();
        let style = Style::default().fg(Color::Black).bg(Color::White);
        self.terminal.draw(|f| {
            let area = f.size();
            f.render_widget(Paragraph::new(lines).style(style), area);
        })?;
        Ok(())
    }

    fn resync(&mut self) -> io::Result<()> {
        self.terminal.clear()
    }
}

pub fn map_event(event: &Event) -> Option<InputAction> {
    match event {
        Event::Key(key) => map_key(key),
        Event::Resize(_, _) => Some(InputAction::Refresh),
        _ => None,
    }
}

fn map_key(key: &KeyEvent) -> Option<InputAction> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    match key.code {
        KeyCode::Esc | KeyCode::Enter => Some(InputAction::Quit),
        KeyCode::Char('l') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(InputAction::Refresh)
        }
        KeyCode::Tab => Some(InputAction::NextFeed),
        _ => None,
    }
}

/// Forwards mapped terminal events until quit, a read error, or the dashboard going away.
///
/// Quit also raises `cancel` so every task watching the flag can stop.
pub async fn forward_input<S>(
    mut events: S,
    actions: mpsc::Sender<InputAction>,
    cancel: watch::Sender<bool>,
) where
    S: Stream<Item = io::Result<Event>> + Unpin,
{
    while let Some(event) = events.next().await {
        let event = match event {
            Ok(event) => event,
            Err(err) => {
                warn!(event = "terminal_input_error", error = %err);
                break;
            }
        };
        let Some(action) = map_event(&event) else {
            continue;
        };
        if action == InputAction::Quit {
            cancel.send_replace(true);
        }
        if actions.send(action).await.is_err() || action == InputAction::Quit {
            break;
        }
    }
    debug!(event = "terminal_input_stopped");
}

pub async fn run_input(actions: mpsc::Sender<InputAction>, cancel: watch::Sender<bool>) {
    forward_input(EventStream::new(), actions, cancel).await;
}
