mod commands;
mod view;

use anyhow::{Context, Result};
use clap::Parser;
use commands::{Command, DELETE_PROMPT, HELP};
use medchat::{ClientConfig, HttpChatApi, ReportUpload, SessionController, SessionState};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use view::Pane;

type Input = Lines<BufReader<Stdin>>;

#[derive(Parser, Debug)]
#[command(author, version, about = "Chat with the medical assistant from the terminal", long_about = None)]
struct Cli {
    /// Base URL of the chat API [env: MEDCHAT_API_URL, default: http://127.0.0.1:5000]
    #[arg(long)]
    api_url: Option<String>,

    /// Request timeout in seconds [env: MEDCHAT_TIMEOUT_SECS]
    #[arg(long)]
    timeout_secs: Option<u64>,

    #[arg(long)]
    connect_timeout_secs: Option<u64>,

    /// Delay before re-listing chats after a reply, in milliseconds [env: MEDCHAT_TITLE_REFRESH_MS]
    #[arg(long)]
    title_refresh_ms: Option<u64>,
}

impl Cli {
    /// Environment settings, overridden by any flags given.
    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::from_env();
        if let Some(url) = &self.api_url {
            config = config.with_base_url(url.as_str());
        }
        if let Some(secs) = self.timeout_secs {
            config.timeout_secs = secs;
        }
        if let Some(secs) = self.connect_timeout_secs {
            config.connect_timeout_secs = secs;
        }
        if let Some(ms) = self.title_refresh_ms {
            config = config.with_title_refresh_delay(Duration::from_millis(ms));
        }
        config
    }
}

/// Logs go to stderr so they stay out of the transcript.
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "medchat=info,medchat_cli=info".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_level(true)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_writer(std::io::stderr),
                )
                .init();
        }
    }
}

/// Pulse a dotted indicator on stderr while a request is outstanding.
fn spawn_loading_indicator(mut updates: watch::Receiver<SessionState>) -> JoinHandle<()> {
    const FRAMES: [&str; 4] = ["   ", ".  ", ".. ", "..."];

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(250));
        let mut loading = false;
        let mut frame = 0;

        loop {
            tokio::select! {
                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let now_loading = updates.borrow_and_update().is_loading;
                    if loading && !now_loading {
                        eprint!("\r   \r");
                    }
                    loading = now_loading;
                }
                _ = ticker.tick(), if loading => {
                    frame = (frame + 1) % FRAMES.len();
                    eprint!("\r{}", FRAMES[frame]);
                }
            }
        }
    })
}

fn prompt(text: &str) -> Result<()> {
    print!("{}", text);
    std::io::stdout().flush().context("failed to flush stdout")
}

fn redraw(controller: &SessionController, pane: &mut Pane) {
    let state = controller.state();
    print!("{}", pane.update(state));
    if let Some(error) = &state.error {
        print!("{}", view::error_banner(error));
    }
}

fn print_sidebar(controller: &SessionController) {
    let state = controller.state();
    print!(
        "{}",
        view::sidebar(&state.chats, state.active_chat_id.as_deref())
    );
}

/// Wait for the next input line, running a scheduled title refresh meanwhile.
async fn next_line(controller: &mut SessionController, input: &mut Input) -> Result<Option<String>> {
    loop {
        let refresh_in = controller.pending_title_refresh();
        tokio::select! {
            line = input.next_line() => return line.context("failed to read from stdin"),
            _ = tokio::time::sleep(refresh_in.unwrap_or_default()), if refresh_in.is_some() => {
                controller.refresh_titles().await;
            }
        }
    }
}

/// Run one command. Returns `false` when the user asked to quit.
async fn run(controller: &mut SessionController, command: Command, input: &mut Input) -> Result<bool> {
    match command {
        Command::Send(text) => controller.send_message(&text).await,
        Command::New => {
            controller.new_chat().await;
            print_sidebar(controller);
        }
        Command::Chats => print_sidebar(controller),
        Command::Open(target) => {
            let chat_id = commands::resolve_chat(&target, &controller.state().chats)
                .map(|chat| chat.id.clone());
            match chat_id {
                Some(chat_id) => controller.select_chat(&chat_id).await,
                None => println!("No chat matches {}", target),
            }
        }
        Command::Delete(target) => {
            let chat_id = commands::resolve_chat(&target, &controller.state().chats)
                .map(|chat| chat.id.clone());
            let Some(chat_id) = chat_id else {
                println!("No chat matches {}", target);
                return Ok(true);
            };

            prompt(DELETE_PROMPT)?;
            let answer = input
                .next_line()
                .await
                .context("failed to read from stdin")?
                .unwrap_or_default();
            if commands::is_confirmed(&answer) {
                controller.delete_chat(&chat_id).await;
                print_sidebar(controller);
            }
        }
        Command::Upload(path) => match ReportUpload::from_path(&path).await {
            Ok(upload) => controller.upload_report(upload).await,
            Err(e) => {
                error!("Failed to read report {}: {}", path.display(), e);
                println!("Could not read {}: {}", path.display(), e);
            }
        },
        Command::Refresh => {
            controller.refresh_chats().await;
            print_sidebar(controller);
        }
        Command::Dismiss => controller.dismiss_error(),
        Command::Help => print!("{}", HELP),
        Command::Quit => return Ok(false),
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = cli.client_config();
    info!("Using chat API at {}", config.base_url);

    let api = HttpChatApi::new(config.clone()).context("invalid chat API configuration")?;
    let mut controller = SessionController::with_config(Arc::new(api), &config);
    let indicator = spawn_loading_indicator(controller.subscribe());

    controller.initialize().await;
    let mut pane = Pane::default();
    print_sidebar(&controller);
    println!("Type /help for commands.");
    redraw(&controller, &mut pane);

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt("> ")?;
        let Some(line) = next_line(&mut controller, &mut input).await? else {
            break;
        };

        let command = match commands::parse(&line) {
            None => continue,
            Some(Ok(command)) => command,
            Some(Err(e)) => {
                println!("{}", e);
                continue;
            }
        };

        if !run(&mut controller, command, &mut input).await? {
            break;
        }
        redraw(&controller, &mut pane);
    }

    indicator.abort();
    info!("Goodbye");
    Ok(())
}
