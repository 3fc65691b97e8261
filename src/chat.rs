use std::time::Instant;

use crossbeam::channel::{Receiver, Sender};
use crossterm::event::{KeyCode, KeyModifiers};
use ratatui::prelude::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style, Stylize};
use ratatui::text::{Line, Span};
use ratatui::widgets::block::{Position, Title};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};

use unicode_width::UnicodeWidthStr;

use crate::config::ConfigurationFile;
use crate::endpoint::{EndpointRequest, EndpointResponse};
use crate::transcript::MessageSender;
use crate::tui::{slice_up_string, Frame, TerminalEvent};
use crate::widget::{ChatWidget, QuickReplyAction};

const TYPING_DOT_PERIOD_S: f64 = 0.4;
const INPUT_PLACEHOLDER: &str = "Ketik pesan…";

// What the storefront should do after the chat overlay has seen a key.
#[derive(Debug, PartialEq)]
pub enum ChatInputOutcome {
    // the overlay used the key
    Consumed,

    // the overlay is closed and didn't look at the key
    Ignored,
}

// The chat widget as drawn over the storefront: the controller plus the bits
// of presentation state that only matter on screen.
pub struct ChatOverlay {
    config: ConfigurationFile,
    widget: ChatWidget,

    // how many messages up from the bottom the transcript is scrolled
    transcript_scroll: usize,

    typing_dots: TypingDots,
}
impl ChatOverlay {
    pub fn new(
        config: ConfigurationFile,
        send_to_server: Sender<EndpointRequest>,
        recv_on_client: Receiver<EndpointResponse>,
    ) -> ChatOverlay {
        let widget = ChatWidget::new(
            send_to_server,
            recv_on_client,
            config.typing_text(),
            config.quick_reply_defaults(),
        );
        ChatOverlay {
            config,
            widget,
            transcript_scroll: 0,
            typing_dots: TypingDots::new(),
        }
    }

    pub fn widget(&self) -> &ChatWidget {
        &self.widget
    }

    pub fn toggle(&mut self) {
        self.widget.toggle();
    }

    // picks up finished endpoint calls; new messages snap the transcript back to the bottom
    pub fn process_incoming(&mut self) -> bool {
        let changed = self.widget.process_incoming_endpoint_messages();
        if changed {
            self.transcript_scroll = 0;
        }
        changed
    }

    pub fn process_input(&mut self, event: TerminalEvent) -> ChatInputOutcome {
        if !self.widget.is_open() {
            return ChatInputOutcome::Ignored;
        }

        if let TerminalEvent::Key(key) = event {
            match key.code {
                KeyCode::Esc => self.widget.close(),
                KeyCode::Enter => {
                    // an action picked with tab wins over the typed text
                    if self.widget.selected_action().is_some() && self.widget.input().is_empty() {
                        self.widget.activate_selected_action();
                    } else {
                        self.widget.submit_input();
                    }
                    self.transcript_scroll = 0;
                }
                KeyCode::Tab => self.widget.select_next_action(),
                KeyCode::BackTab => self.widget.select_previous_action(),
                KeyCode::Backspace => self.widget.pop_input(),
                KeyCode::PageUp => {
                    self.transcript_scroll = std::cmp::min(
                        self.transcript_scroll + 1,
                        self.widget.transcript().len().saturating_sub(1),
                    );
                }
                KeyCode::PageDown => {
                    self.transcript_scroll = self.transcript_scroll.saturating_sub(1);
                }
                KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                    self.widget.push_input(c);
                }
                _ => {}
            }
        }
        ChatInputOutcome::Consumed
    }

    pub fn render(&mut self, frame: &mut Frame, area: Rect) {
        if !self.widget.is_open() {
            return;
        }

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green))
            .title(format!(" {} ", self.config.assistant_name()))
            .title(
                Title::from(" tab: pilih tombol · enter: kirim · esc: tutup ")
                    .position(Position::Bottom),
            );
        let inner = block.inner(area);
        frame.render_widget(Clear, area);
        frame.render_widget(block, area);

        let action_lines = self.build_action_lines(inner.width as usize);
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints(
                [
                    Constraint::Min(3),
                    Constraint::Length(if self.widget.is_typing() { 1 } else { 0 }),
                    Constraint::Length(action_lines.len() as u16),
                    Constraint::Length(3),
                ]
                .as_ref(),
            )
            .split(inner);

        self.render_transcript(frame, chunks[0]);
        if self.widget.is_typing() {
            self.render_typing_indicator(frame, chunks[1]);
        }
        frame.render_widget(Paragraph::new(action_lines), chunks[2]);
        self.render_input(frame, chunks[3]);
    }

    fn name_and_text_styles(&self, sender: MessageSender) -> (Style, Style) {
        let (name_rgb, text_rgb) = match sender {
            MessageSender::Bot => (self.config.assistant_name_rgb, self.config.assistant_text_rgb),
            MessageSender::User => (self.config.display_name_rgb, self.config.text_rgb),
        };
        let mut name_style = Style::default();
        let mut text_style = Style::default();
        if let Some(rgb) = name_rgb {
            name_style = name_style.fg(Color::Rgb(rgb[0], rgb[1], rgb[2]));
        }
        if let Some(rgb) = text_rgb {
            text_style = text_style.fg(Color::Rgb(rgb[0], rgb[1], rgb[2]));
        }
        (name_style, text_style)
    }

    fn render_transcript(&self, frame: &mut Frame, area: Rect) {
        let lines_needed = area.height as usize;
        let width = area.width as usize;
        let add_divider = self
            .config
            .add_visual_buffer_between_messages
            .unwrap_or(false);

        // walk backwards from the newest message, stacking lines on top until the area is full
        let mut stacked: Vec<Line> = Vec::new();
        for message in self
            .widget
            .transcript()
            .iter()
            .rev()
            .skip(self.transcript_scroll)
        {
            let name = match message.sender {
                MessageSender::Bot => self.config.assistant_name(),
                MessageSender::User => self.config.display_name.as_str(),
            };
            let (name_style, text_style) = self.name_and_text_styles(message.sender);

            let mut message_lines: Vec<Line> = Vec::new();
            for (line_index, text_line) in message.lines().enumerate() {
                let reserve = if line_index == 0 { speaker_prefix_width(name) } else { 0 };
                for (split_index, piece) in
                    slice_up_string(text_line, width, reserve).into_iter().enumerate()
                {
                    let mut spans = Vec::new();
                    if line_index == 0 && split_index == 0 {
                        spans.push(Span::styled(name.to_owned(), name_style.bold()));
                        spans.push(Span::styled(": ", text_style.bold()));
                    }
                    spans.push(Span::styled(piece, text_style));
                    let line = Line::from(spans);
                    message_lines.push(match message.sender {
                        MessageSender::User => line.alignment(Alignment::Right),
                        MessageSender::Bot => line.alignment(Alignment::Left),
                    });
                }
            }

            if add_divider && !stacked.is_empty() {
                message_lines.push(Line::from(" "));
            }
            message_lines.extend(stacked);
            stacked = message_lines;

            if stacked.len() >= lines_needed {
                break;
            }
        }

        // keep the newest lines when there are more than fit
        let overflow = stacked.len().saturating_sub(lines_needed);
        let visible: Vec<Line> = stacked.into_iter().skip(overflow).collect();
        frame.render_widget(Paragraph::new(visible), area);
    }

    fn render_typing_indicator(&self, frame: &mut Frame, area: Rect) {
        let line = Line::from(vec![
            Span::styled(
                self.widget.typing_text().to_owned(),
                Style::default().add_modifier(Modifier::ITALIC).fg(Color::DarkGray),
            ),
            Span::raw(" "),
            Span::styled(self.typing_dots.frame(), Style::default().fg(Color::Green)),
        ]);
        frame.render_widget(Paragraph::new(line), area);
    }

    // lays the quick replies and then the order buttons out as rows of [label] chips
    fn build_action_lines(&self, width: usize) -> Vec<Line<'static>> {
        let selected = self.widget.selected_action();
        let mut lines: Vec<Line<'static>> = Vec::new();
        let mut index = 0;

        let groups: [(&[QuickReplyAction], Color); 2] = [
            (self.widget.quick_replies(), Color::Cyan),
            (self.widget.order_buttons(), Color::Yellow),
        ];
        for (actions, color) in groups {
            if actions.is_empty() {
                continue;
            }
            let mut spans: Vec<Span<'static>> = Vec::new();
            let mut used = 0;
            for action in actions {
                let chip = format!("[{}]", action.label);
                let chip_width = UnicodeWidthStr::width(chip.as_str()) + 1;
                if used > 0 && used + chip_width > width {
                    lines.push(Line::from(std::mem::take(&mut spans)));
                    used = 0;
                }
                let mut style = Style::default().fg(color);
                if selected == Some(index) {
                    style = style.add_modifier(Modifier::REVERSED);
                }
                spans.push(Span::styled(chip, style));
                spans.push(Span::raw(" "));
                used += chip_width;
                index += 1;
            }
            if !spans.is_empty() {
                lines.push(Line::from(spans));
            }
        }
        lines
    }

    fn render_input(&self, frame: &mut Frame, area: Rect) {
        let content = if self.widget.input().is_empty() {
            Line::from(Span::styled(
                INPUT_PLACEHOLDER,
                Style::default().fg(Color::Rgb(100, 100, 100)),
            ))
        } else {
            Line::from(self.widget.input().to_owned())
        };
        let border_color = if self.widget.input_focused() {
            Color::Cyan
        } else {
            Color::DarkGray
        };
        let input = Paragraph::new(content).wrap(Wrap { trim: false }).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border_color)),
        );
        frame.render_widget(input, area);
    }
}

// display columns taken by the "name: " prefix on a message's first line
fn speaker_prefix_width(name: &str) -> usize {
    UnicodeWidthStr::width(name) + 2
}

// The three bouncing dots next to the typing label.
struct TypingDots {
    start_time: Instant,
}
impl TypingDots {
    fn new() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }

    fn frame(&self) -> &'static str {
        const FRAMES: [&str; 4] = ["   ", ".  ", ".. ", "..."];
        let step = (self.start_time.elapsed().as_secs_f64() / TYPING_DOT_PERIOD_S) as usize;
        FRAMES[step % FRAMES.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::unbounded;
    use crossterm::event::{KeyEvent, KeyEventKind, KeyEventState};

    fn key(code: KeyCode) -> TerminalEvent {
        TerminalEvent::Key(KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        })
    }

    #[test]
    fn closed_overlay_ignores_keys() {
        let (send_to_server, _recv_on_server) = unbounded();
        let (_send_to_client, recv_on_client) = unbounded();
        let mut overlay =
            ChatOverlay::new(ConfigurationFile::default(), send_to_server, recv_on_client);
        assert_eq!(overlay.process_input(key(KeyCode::Char('x'))), ChatInputOutcome::Ignored);
        assert_eq!(overlay.widget().input(), "");
    }

    #[test]
    fn typing_and_enter_sends_the_message() {
        let (send_to_server, recv_on_server) = unbounded();
        let (_send_to_client, recv_on_client) = unbounded();
        let mut overlay =
            ChatOverlay::new(ConfigurationFile::default(), send_to_server, recv_on_client);
        overlay.toggle();
        assert!(matches!(recv_on_server.try_recv(), Ok(EndpointRequest::Greeting(_))));

        for c in "Promo!".chars() {
            overlay.process_input(key(KeyCode::Char(c)));
        }
        overlay.process_input(key(KeyCode::Backspace));
        assert_eq!(overlay.widget().input(), "Promo");
        overlay.process_input(key(KeyCode::Enter));
        assert_eq!(overlay.widget().input(), "");
        assert_eq!(
            overlay.widget().transcript().last().map(|m| m.text.as_str()),
            Some("Promo")
        );

        overlay.process_input(key(KeyCode::Esc));
        assert!(!overlay.widget().is_open());
    }

    #[test]
    fn action_chips_wrap_to_the_width() {
        let (send_to_server, _recv_on_server) = unbounded();
        let (_send_to_client, recv_on_client) = unbounded();
        let mut overlay =
            ChatOverlay::new(ConfigurationFile::default(), send_to_server, recv_on_client);
        overlay.toggle();
        let lines = overlay.build_action_lines(30);
        assert!(lines.len() > 1);
        let chips: usize = lines.iter().map(|l| l.spans.len() / 2).sum();
        assert_eq!(chips, overlay.widget().quick_replies().len());
    }

    #[test]
    fn speaker_prefix_is_measured_in_columns() {
        assert_eq!(speaker_prefix_width("Anda"), 6);
        // 'é' is two bytes but a single column
        assert_eq!(speaker_prefix_width("Andé"), 6);
        // wide glyphs take two columns each
        assert_eq!(speaker_prefix_width("客服"), 6);
    }
}
