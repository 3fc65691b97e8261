use crossterm::event::KeyCode;
use ratatui::{
    prelude::{Alignment, Constraint, Direction, Layout},
    style::Stylize,
    text::Line,
    widgets::Paragraph,
};

use crate::tui::{Frame, ProcessInputResult, TerminalEvent, TerminalRenderable};

#[derive(Default)]
pub struct MainMenuState {}
impl TerminalRenderable for MainMenuState {
    fn process_input(&mut self, event: TerminalEvent) -> ProcessInputResult {
        if let TerminalEvent::Key(key) = event {
            match key.code {
                KeyCode::Char('q') => return ProcessInputResult::Quit,
                KeyCode::Char('s') | KeyCode::Enter => {
                    return ProcessInputResult::ChangeScene(
                        crate::application::ApplicationState::Storefront,
                    );
                }
                _ => {}
            }
        }

        ProcessInputResult::None
    }

    fn render(&mut self, frame: &mut Frame) {
        let main_title_seq = vec![
            Line::from("Kaloriz".bold()),
            Line::from("-------"),
            Line::from("makanan sehat, minuman segar, camilan rendah kalori".italic()),
            Line::from(""),
            Line::from("(s)torefront"),
            Line::from(""),
            Line::from("(q)uit"),
        ];

        let hchunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(
                [
                    Constraint::Percentage(20),
                    Constraint::Percentage(60),
                    Constraint::Percentage(20),
                ]
                .as_ref(),
            )
            .split(frame.size());

        let vchunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(20), Constraint::Min(7)].as_ref())
            .split(hchunks[1]);

        let title = Paragraph::new(main_title_seq).alignment(Alignment::Center);
        frame.render_widget(title, vchunks[1]);
    }
}
