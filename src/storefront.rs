use std::time::Instant;

use chrono::Utc;
use crossbeam::channel::{Receiver, Sender};
use crossterm::event::KeyCode;
use ratatui::prelude::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style, Stylize};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, Paragraph};

use crate::chat::{ChatInputOutcome, ChatOverlay};
use crate::config::ConfigurationFile;
use crate::countdown::{FlashSaleBoard, FlashSaleCard};
use crate::endpoint::{EndpointRequest, EndpointResponse};
use crate::tui::{
    centered_rect, Frame, MessageBoxModalWidget, ProcessInputResult, StatefulList, TerminalEvent,
    TerminalRenderable,
};

const NARROW_TERMINAL_WIDTH: u16 = 80;
const HELP_TEXT: &str = "j/k    = pilih produk flash sale\n\
                         b      = beli produk terpilih\n\
                         c      = buka/tutup chat Asisten Kaloriz\n\
                         esc    = kembali ke menu utama\n\
                         \n\
                         Di dalam chat:\n\
                         tab    = pilih tombol cepat / pesanan\n\
                         enter  = kirim pesan atau tombol terpilih\n\
                         pgup   = gulir percakapan ke atas\n\
                         esc    = tutup chat";

// The storefront scene: the flash sale board with the chat widget floating over it.
pub struct StorefrontState {
    board: FlashSaleBoard,

    // indices into board.cards, kept as a list so selection wraps
    card_list: StatefulList<usize>,

    chat: ChatOverlay,

    // contains a modal dialog widget used to show a message or alert to the user
    modal_messagebox: Option<MessageBoxModalWidget>,
}
impl StorefrontState {
    pub fn new(
        config: ConfigurationFile,
        send_to_server: Sender<EndpointRequest>,
        recv_on_client: Receiver<EndpointResponse>,
    ) -> StorefrontState {
        let board = FlashSaleBoard::new(&config.flash_sales);
        let card_list = StatefulList::with_items((0..board.cards.len()).collect());
        StorefrontState {
            board,
            card_list,
            chat: ChatOverlay::new(config, send_to_server, recv_on_client),
            modal_messagebox: None,
        }
    }

    fn selected_card(&self) -> Option<&FlashSaleCard> {
        self.card_list
            .selected()
            .and_then(|index| self.board.cards.get(*index))
    }

    fn try_purchase(&mut self) {
        let message = match self.selected_card() {
            None => return,
            Some(card) => match card.purchase_hint() {
                Some(hint) => MessageBoxModalWidget::new("Tidak tersedia", hint, 50, 20),
                None => MessageBoxModalWidget::new(
                    "Keranjang",
                    &format!("{} ditambahkan ke keranjang.", card.name),
                    50,
                    20,
                ),
            },
        };
        self.modal_messagebox = Some(message);
    }

    fn render_board(&mut self, frame: &mut Frame, area: Rect) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title(" Flash Sale ".bold());

        if self.board.is_empty() {
            let empty = Paragraph::new("Belum ada flash sale saat ini.").block(block);
            frame.render_widget(empty, area);
            return;
        }

        let items: Vec<ListItem> = self
            .board
            .cards
            .iter()
            .map(|card| {
                let countdown_style = if card.is_ended() {
                    Style::default().fg(Color::DarkGray)
                } else {
                    Style::default().fg(Color::LightRed).add_modifier(Modifier::BOLD)
                };
                let name_style = if card.is_ended() {
                    Style::default().fg(Color::DarkGray).add_modifier(Modifier::CROSSED_OUT)
                } else {
                    Style::default()
                };
                let mut spans = vec![
                    Span::styled(format!("{:<28}", card.name), name_style),
                    Span::raw(format!("{:>12}  ", card.price.as_deref().unwrap_or(""))),
                    Span::styled(format!("{:<20}", card.countdown_text()), countdown_style),
                ];
                spans.push(if card.purchase_enabled() {
                    Span::styled("[Beli Sekarang]", Style::default().fg(Color::Green))
                } else {
                    Span::styled("[Beli Sekarang]", Style::default().fg(Color::DarkGray))
                });
                ListItem::new(Line::from(spans))
            })
            .collect();

        let list = List::new(items)
            .block(block)
            .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
            .highlight_symbol("> ");
        frame.render_stateful_widget(list, area, &mut self.card_list.state);
    }
}

impl TerminalRenderable for StorefrontState {
    fn process_input(&mut self, event: TerminalEvent) -> ProcessInputResult {
        // make sure to check for finished requests from the endpoint worker
        self.chat.process_incoming();

        if let TerminalEvent::Tick = event {
            self.board.tick(Utc::now(), Instant::now());
            return ProcessInputResult::None;
        }

        if let Some(msgbox) = self.modal_messagebox.as_mut() {
            msgbox.process_input(event);
            if msgbox.is_finished {
                self.modal_messagebox = None;
            }
            return ProcessInputResult::None;
        }

        if self.chat.process_input(event) == ChatInputOutcome::Consumed {
            return ProcessInputResult::None;
        }

        if let TerminalEvent::Key(key) = event {
            match key.code {
                KeyCode::Esc => {
                    return ProcessInputResult::ChangeScene(
                        crate::application::ApplicationState::MainMenu,
                    );
                }
                KeyCode::Char('c') => self.chat.toggle(),
                KeyCode::Char('j') | KeyCode::Down => self.card_list.next(),
                KeyCode::Char('k') | KeyCode::Up => self.card_list.previous(),
                KeyCode::Char('b') | KeyCode::Enter => self.try_purchase(),
                KeyCode::Char('?') => {
                    self.modal_messagebox = Some(MessageBoxModalWidget::new(
                        "Bantuan:", HELP_TEXT, 60, 60,
                    ));
                }
                _ => {}
            }
        }

        ProcessInputResult::None
    }

    fn render(&mut self, frame: &mut Frame) {
        let vchunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(3), Constraint::Length(1)].as_ref())
            .split(frame.size());

        self.render_board(frame, vchunks[0]);

        let status = if self.chat.widget().is_open() {
            Line::from("")
        } else {
            Line::from(vec![
                Span::styled(" 💬 Chat ", Style::default().fg(Color::Black).bg(Color::Green)),
                Span::raw("  c: buka chat · ?: bantuan · esc: menu"),
            ])
        };
        frame.render_widget(Paragraph::new(status), vchunks[1]);

        self.chat.render(frame, chat_area(vchunks[0]));

        if let Some(msgbox) = &self.modal_messagebox {
            msgbox.render(frame);
        }
    }
}

// the chat docks to the right like the storefront's bubble widget, unless the
// terminal is too narrow for a side panel
fn chat_area(area: Rect) -> Rect {
    if area.width < NARROW_TERMINAL_WIDTH {
        return centered_rect(90, 90, area);
    }
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)].as_ref())
        .split(area)[1]
}
