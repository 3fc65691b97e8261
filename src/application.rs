use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::{
    config::ConfigurationFile,
    endpoint::ConversationEndpoint,
    main_menu::MainMenuState,
    storefront::StorefrontState,
    tui::{ProcessInputResult, Tui},
};

// This enumeration indicates what scene is active in the application.
#[derive(PartialEq)]
pub enum ApplicationState {
    MainMenu,
    Storefront,
}

// This is the main application state object for the app.
pub struct Application<'a> {
    // this is the terminal abstraction used to hide implementation details
    // away from the application.
    terminal: &'a mut Tui,

    // our active configuration file for the app, loaded
    config: ConfigurationFile,

    // the conversation endpoint worker thread controller
    pub endpoint: ConversationEndpoint,

    // an enum indicating which state is active in the application
    current_state: ApplicationState,

    // contains the main menu scene's state
    mainmenu_state: MainMenuState,

    // the storefront is mounted once and kept, so the chat transcript lives
    // as long as the application does
    storefront_state: Option<StorefrontState>,
}
impl<'a> Application<'a> {
    pub fn new(
        terminal: &'a mut Tui,
        config: ConfigurationFile,
        endpoint: ConversationEndpoint,
    ) -> Application<'a> {
        Application {
            terminal,
            config,
            endpoint,
            current_state: ApplicationState::MainMenu,
            mainmenu_state: MainMenuState::default(),
            storefront_state: None,
        }
    }

    // Runs the application loop that draws the current scene and then
    // processes the input.
    pub fn run(&mut self, ui_draw_tick_rate: u64) -> Result<()> {
        let draw_tick_rate = Duration::from_millis(ui_draw_tick_rate);
        let mut draw_last_tick = Instant::now();
        loop {
            let perform_draw: bool = draw_tick_rate < draw_last_tick.elapsed();
            let mut proc_result = ProcessInputResult::None;

            match self.current_state {
                ApplicationState::MainMenu => {
                    if perform_draw {
                        self.terminal
                            .draw(&mut self.mainmenu_state)
                            .context("failed to draw the main menu UI")?;
                    }
                    proc_result = self.terminal.process_input(&mut self.mainmenu_state);
                }
                ApplicationState::Storefront => {
                    if let Some(storefront) = self.storefront_state.as_mut() {
                        if perform_draw {
                            self.terminal
                                .draw(storefront)
                                .context("failed to draw the storefront UI")?;
                        }
                        proc_result = self.terminal.process_input(storefront);
                    }
                }
            };

            if perform_draw {
                draw_last_tick += draw_tick_rate;
            }

            // Based on what the current scene decides, possibly take an action
            match proc_result {
                ProcessInputResult::Quit => {
                    return Ok(());
                }
                ProcessInputResult::ChangeScene(new_scene) => {
                    self.current_state = new_scene;
                    if self.current_state == ApplicationState::Storefront
                        && self.storefront_state.is_none()
                    {
                        self.storefront_state = Some(StorefrontState::new(
                            self.config.clone(),
                            self.endpoint.send_to_server.clone(),
                            self.endpoint.recv_on_client.clone(),
                        ));
                    }
                }
                ProcessInputResult::None => {}
            }

            // put the loop to sleep
            std::thread::sleep(Duration::from_millis(2));
        }
    }
}
