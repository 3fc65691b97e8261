use anyhow::{Context, Result};
use crossbeam::channel::Receiver;
use crossterm::{
    event::{self, Event as CrosstermEvent, KeyCode, KeyEvent as CrosstermKeyEvent},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    prelude::{Constraint, CrosstermBackend, Direction, Layout, Rect},
    style::{Color, Style},
    text::Line,
    widgets::{Block, Borders, Clear, ListState, Paragraph, Wrap},
    Terminal,
};
use std::{
    io, panic, thread,
    time::{Duration, Instant},
};
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

use crate::application::ApplicationState;

// Used to control application flow from the specialized input handlers
// for each ApplicationState scene.
#[derive(PartialEq)]
pub enum ProcessInputResult {
    // no action is needed
    None,

    // user requested the app to quit
    Quit,

    // user has requested a scene change
    ChangeScene(ApplicationState),
}

// The storefront owns stdout for its whole lifetime, so the crossterm backend on stdout is all we need.
pub type Frame<'a> = ratatui::Frame<'a>;
pub type CrosstermTerminal = ratatui::Terminal<ratatui::backend::CrosstermBackend<std::io::Stdout>>;

// Implement this on all scene state objects that can be drawn.
pub trait TerminalRenderable {
    fn render(&mut self, f: &mut Frame);
    fn process_input(&mut self, event: TerminalEvent) -> ProcessInputResult;
}

// The terminal events the scenes care about.
#[derive(Clone, Copy, Debug)]
pub enum TerminalEvent {
    // periodic heartbeat; drives the endpoint polling and flash sale countdowns
    Tick,
    // key press
    Key(CrosstermKeyEvent),
    // terminal resize; the next draw picks up the new size
    Resize,
}

pub struct TerminalEventHandler {
    receiver: Receiver<TerminalEvent>,
    _handler: thread::JoinHandle<()>,
}
impl TerminalEventHandler {
    // Spawns the input thread, which also emits a Tick every `tick_rate` milliseconds.
    pub fn new(tick_rate: u64) -> Self {
        let tick_rate = Duration::from_millis(tick_rate);
        let (sender, receiver) = crossbeam::channel::unbounded();
        let _handler = thread::spawn(move || {
            let mut last_tick = Instant::now();
            loop {
                let timeout = tick_rate
                    .checked_sub(last_tick.elapsed())
                    .unwrap_or(tick_rate);
                let polled = match event::poll(timeout) {
                    Ok(p) => p,
                    Err(err) => {
                        log::error!("Polling terminal events failed: {err}");
                        return;
                    }
                };
                if polled {
                    let forwarded = match event::read() {
                        // only 'press' events, for multiplatform compatibility
                        Ok(CrosstermEvent::Key(e)) if e.kind == event::KeyEventKind::Press => {
                            sender.send(TerminalEvent::Key(e))
                        }
                        Ok(CrosstermEvent::Resize(_, _)) => sender.send(TerminalEvent::Resize),
                        Ok(_) => Ok(()),
                        Err(err) => {
                            log::error!("Reading a polled terminal event failed: {err}");
                            Ok(())
                        }
                    };
                    if forwarded.is_err() {
                        // the application has gone away
                        return;
                    }
                }

                if last_tick.elapsed() >= tick_rate {
                    if sender.send(TerminalEvent::Tick).is_err() {
                        return;
                    }
                    last_tick = Instant::now();
                }
            }
        });

        Self { receiver, _handler }
    }

    // returns the next pending event, or None if nothing is waiting.
    pub fn get_next_input(&self, timeout_ms: Option<u64>) -> Option<TerminalEvent> {
        if self.receiver.is_empty() {
            return None;
        }
        let timeout = Duration::from_millis(timeout_ms.unwrap_or(16));
        match self.receiver.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(err) => {
                log::error!("Failed to receive the event on the input handler pump: {err}");
                None
            }
        }
    }
}

// A thin wrapper around the terminal backend and its event pump.
// enable()/disable() are associated functions so the panic hook can call them.
pub struct Tui {
    terminal: CrosstermTerminal,
    pub events: TerminalEventHandler,
    input_tick_rate_ms: u64,
}
impl Tui {
    pub fn new(input_tick_rate_ms: u64) -> Result<Self> {
        let terminal = Terminal::new(CrosstermBackend::new(io::stdout()))
            .context("creating terminal backend interface failed")?;
        let events = TerminalEventHandler::new(input_tick_rate_ms);

        let panic_hook = panic::take_hook();
        panic::set_hook(Box::new(move |panic| {
            if let Err(err) = Self::disable() {
                eprintln!("failed to reset the terminal on detected panic: {err}");
            }
            panic_hook(panic);
        }));

        Ok(Self {
            terminal,
            events,
            input_tick_rate_ms,
        })
    }

    pub fn enable() -> Result<()> {
        enable_raw_mode().context("Failed to enable raw mode")?;
        execute!(io::stdout(), crossterm::terminal::EnterAlternateScreen)
            .context("unable to enter alternate screen")?;
        Ok(())
    }

    pub fn disable() -> Result<()> {
        disable_raw_mode().context("failed to disable raw mode")?;
        execute!(io::stdout(), crossterm::terminal::LeaveAlternateScreen)
            .context("unable to switch to main screen")?;
        Ok(())
    }

    pub fn draw<T: TerminalRenderable>(&mut self, b: &mut T) -> Result<()> {
        self.terminal.draw(|frame| b.render(frame))?;
        Ok(())
    }

    // feeds pending events to the scene until it asks for something or we run out.
    pub fn process_input<T: TerminalRenderable>(&mut self, b: &mut T) -> ProcessInputResult {
        while let Some(terminal_event) = self.events.get_next_input(Some(self.input_tick_rate_ms)) {
            let result = b.process_input(terminal_event);
            if result != ProcessInputResult::None {
                return result;
            }
        }

        ProcessInputResult::None
    }
}

pub fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Percentage((100 - percent_y) / 2),
                Constraint::Percentage(percent_y),
                Constraint::Percentage((100 - percent_y) / 2),
            ]
            .as_ref(),
        )
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints(
            [
                Constraint::Percentage((100 - percent_x) / 2),
                Constraint::Percentage(percent_x),
                Constraint::Percentage((100 - percent_x) / 2),
            ]
            .as_ref(),
        )
        .split(popup_layout[1])[1]
}

// A list selection that wraps at both ends.
pub struct StatefulList<T> {
    pub state: ListState,
    pub items: Vec<T>,
}
impl<T> StatefulList<T> {
    pub fn with_items(items: Vec<T>) -> StatefulList<T> {
        let mut state = ListState::default();
        if !items.is_empty() {
            state.select(Some(0));
        }
        StatefulList { state, items }
    }

    pub fn next(&mut self) {
        if self.items.is_empty() {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i + 1 < self.items.len() => i + 1,
            _ => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        if self.items.is_empty() {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => self.items.len() - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
    }

    pub fn selected(&self) -> Option<&T> {
        self.state.selected().and_then(|i| self.items.get(i))
    }
}

// A basic modal dialog box with a configurable title and body text.
pub struct MessageBoxModalWidget {
    pub title: String,
    pub text: String,

    // set by `process_input()` once the user dismisses the box
    pub is_finished: bool,

    // the maximum share of the screen to take up, in percent
    pub width_pct: u16,
    pub height_pct: u16,
}
impl MessageBoxModalWidget {
    pub fn new(title: &str, text: &str, width_pct: u16, height_pct: u16) -> Self {
        Self {
            title: title.to_string(),
            text: text.to_string(),
            is_finished: false,
            width_pct,
            height_pct,
        }
    }

    pub fn process_input(&mut self, event: TerminalEvent) {
        if let TerminalEvent::Key(key) = event {
            if matches!(key.code, KeyCode::Esc | KeyCode::Enter) {
                self.is_finished = true;
            }
        }
    }

    pub fn render(&self, frame: &mut Frame) {
        let mut area = centered_rect(self.width_pct, self.height_pct, frame.size());
        let split_width = area.width.saturating_sub(2) as usize;

        let msgbox_lines: Vec<Line> = self
            .text
            .lines()
            .flat_map(|line| slice_up_string(line, split_width, 0))
            .map(Line::from)
            .collect();

        // the box grows to the number of lines plus the border
        area.height = std::cmp::min(area.height, 2 + msgbox_lines.len() as u16);

        let textarea = Paragraph::new(msgbox_lines)
            .wrap(Wrap { trim: false })
            .block(
                Block::default()
                    .border_style(Style::default().fg(Color::Cyan))
                    .title(self.title.as_str())
                    .borders(Borders::ALL),
            );

        frame.render_widget(Clear, area);
        frame.render_widget(textarea, area);
    }
}

// Word wraps `source` into lines no wider than `max_width` display columns.
// `leading_space_reserve` shortens only the first line, leaving room for a
// speaker name that gets prefixed later. Words wider than a whole line are
// broken up by grapheme.
pub fn slice_up_string(source: &str, max_width: usize, leading_space_reserve: usize) -> Vec<String> {
    let max_width = max_width.max(1);
    let mut limit = max_width.saturating_sub(leading_space_reserve).max(1);

    if UnicodeWidthStr::width(source) <= limit {
        return vec![source.to_owned()];
    }

    let mut result: Vec<String> = Vec::new();
    let mut line = String::new();
    let mut line_width = 0;

    for word in source.split_word_bounds() {
        let word_width = UnicodeWidthStr::width(word);
        let is_space = word.chars().all(char::is_whitespace);

        if line_width + word_width <= limit {
            line.push_str(word);
            line_width += word_width;
            continue;
        }

        // the word doesn't fit, so close out the current line
        if !line.trim().is_empty() {
            result.push(line.trim_end().to_owned());
            limit = max_width;
        }
        line.clear();
        line_width = 0;
        if is_space {
            continue;
        }

        if word_width <= limit {
            line.push_str(word);
            line_width = word_width;
            continue;
        }

        for grapheme in word.graphemes(true) {
            let g_width = UnicodeWidthStr::width(grapheme);
            if line_width + g_width > limit && !line.is_empty() {
                result.push(std::mem::take(&mut line));
                line_width = 0;
                limit = max_width;
            }
            line.push_str(grapheme);
            line_width += g_width;
        }
    }

    if !line.trim().is_empty() {
        result.push(line.trim_end().to_owned());
    }
    result
}
