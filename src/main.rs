use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use chatbox::app::App;
use chatbox::config::Config;
use chatbox::dispatcher::{CompletionReceiver, Dispatcher, SendPolicy};
use chatbox::tui::{self, EventHandler, Tui};
use chatbox::{handler, logging, ui};

#[derive(Parser, Debug)]
#[command(name = "chatbox", version)]
#[command(about = "Chat with an OpenAI-compatible completion endpoint from the terminal")]
struct Cli {
    /// Chat-completion endpoint URL (overrides config and CHATBOX_ENDPOINT)
    #[arg(short, long)]
    endpoint: Option<String>,
    /// Model name sent with each request
    #[arg(short, long)]
    model: Option<String>,
    /// Token limit for each reply
    #[arg(long)]
    max_tokens: Option<u32>,
    /// Config file to use instead of the default location
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Refuse new messages while a reply is pending
    #[arg(long)]
    exclusive: bool,
    /// Log file location
    #[arg(long)]
    log_file: Option<PathBuf>,
    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load_from(path)?,
            None => Config::load()?,
        }
        .with_env_overrides();

        if let Some(endpoint) = &self.endpoint {
            config.endpoint = Some(endpoint.clone());
        }
        if let Some(model) = &self.model {
            config.model = Some(model.clone());
        }
        if let Some(max_tokens) = self.max_tokens {
            config.max_tokens = Some(max_tokens);
        }
        if self.exclusive {
            config.send_policy = Some(SendPolicy::Exclusive);
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_path = match &cli.log_file {
        Some(path) => path.clone(),
        None => logging::default_log_path()?,
    };
    logging::init(&log_path, cli.verbose)?;

    let config = cli.load_config()?;
    let client = config.build_client()?;
    tracing::info!(endpoint = client.endpoint(), "starting chat session");

    let (dispatcher, completions) = Dispatcher::new(config.chat_settings(), Arc::new(client));
    let mut app = App::new(dispatcher, config.clear_input_on_send());

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let result = run(&mut terminal, &mut app, completions).await;
    tui::restore()?;

    if let Err(e) = &result {
        tracing::error!(error = ?e, "chat session failed");
    }
    result
}

async fn run(terminal: &mut Tui, app: &mut App, mut completions: CompletionReceiver) -> Result<()> {
    let mut events = EventHandler::new();

    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        tokio::select! {
            event = events.next() => match event {
                Some(event) => handler::handle_event(app, event),
                None => break,
            },
            Some(completion) = completions.recv() => app.apply_completion(completion),
        }
    }

    Ok(())
}
