use anyhow::{Context, Result};
use application::Application;

use endpoint::{ConversationEndpoint, EndpointRequest, HttpConversationClient};
use simple_logger::SimpleLogger;
use tui::Tui;

mod application;
mod chat;
mod config;
mod countdown;
mod endpoint;
mod main_menu;
mod storefront;
mod transcript;
mod tui;
mod widget;

// This is how long the timeout should be in milliseconds for the terminal's backend
const INPUT_THREAD_READ_TIMEOUT_MS: u64 = 1000 / 4;
const UI_DRAW_TICK_RATE: u64 = 1000 / 30;

fn main() -> Result<()> {
    // parse the command-line arguments
    let cmd_arg_matches = clap::Command::new("kaloriz_chat")
        .about("kaloriz_chat: the Kaloriz storefront and shop assistant in your terminal.")
        .arg(
            clap::Arg::new("config-file")
                .short('c')
                .long("config-file")
                .action(clap::ArgAction::Set)
                .value_name("FILE")
                .help("Specifies the configuration file to load instead of searching for config.yaml."),
        )
        .arg(
            clap::Arg::new("endpoint-url")
                .short('u')
                .long("endpoint-url")
                .action(clap::ArgAction::Set)
                .value_name("URL")
                .help("The storefront host serving the chatbot endpoint, e.g. http://localhost:8000"),
        )
        .get_matches();

    SimpleLogger::new()
        .with_level(log::LevelFilter::Warn)
        .env()
        .with_colors(true)
        .init()
        .context("failed to initialize the logger")?;

    // ***********************************************************************
    // load the configuration file for the application.
    let custom_config_filename: Option<&String> = cmd_arg_matches.get_one::<String>("config-file");
    if let Some(filename) = custom_config_filename {
        if !std::path::Path::new(filename).exists() {
            println!("The configuration file '{filename}' is missing.");
            std::process::exit(1);
        }
    }

    let mut config = config::ConfigurationFile::load_config(custom_config_filename);
    if let Some(url) = cmd_arg_matches.get_one::<String>("endpoint-url") {
        config.endpoint_url = Some(url.to_owned());
    }

    // ***********************************************************************
    // Spawn the conversation endpoint worker thread.
    let transport = HttpConversationClient::new(&config)
        .context("failed to set up the conversation endpoint client")?;
    log::debug!("Conversation endpoint: {}", config.conversation_url());
    let endpoint = ConversationEndpoint::spawn(transport);

    // ***********************************************************************
    // setup the terminal and run the loop, hoping to restore terminal on exit.
    let mut tui = Tui::new(INPUT_THREAD_READ_TIMEOUT_MS)
        .context("failed to create the terminal interface")?;
    Tui::enable().context("should have been able to start the terminal interface")?;

    // **********************************************************************
    // run the actual app
    let mut app = Application::new(&mut tui, config, endpoint);
    if let Err(err) = app.run(UI_DRAW_TICK_RATE) {
        log::error!("Application loop failed: {err}")
    }

    // *******************************************************************
    // tell the worker to shut down. a request still in flight is bounded by the
    // client timeout, so waiting on the join can't hang forever.
    let shutdown_req_result = app
        .endpoint
        .send_to_server
        .try_send(EndpointRequest::ImmediateShutdown);
    if shutdown_req_result.is_ok() {
        let _ = app.endpoint.handle.join();
    } else if let Err(err) = shutdown_req_result {
        log::error!("Failed to shutdown the conversation endpoint thread: {err}");
    }

    // ***************************************************************
    // restore the terminal now that the application is quitting.
    Tui::disable().context("failed to disable the terminal interface")?;

    Ok(())
}
