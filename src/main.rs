use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use solo_live::config::Personality;
use solo_live::kernel::event::{Command, FacingMode, LiveMode};
use solo_live::platform::SystemDevices;
use solo_live::services::live::GeminiConnector;
use solo_live::{LiveConfig, LiveState, SessionController};

#[derive(Parser, Debug)]
#[command(name = "solo-live", about = "Realtime voice and camera assistant")]
struct Cli {
    /// TOML config file. Environment variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    view: View,
}

#[derive(Subcommand, Debug)]
enum View {
    /// Audio-only conversation.
    Voice {
        #[arg(long)]
        personality: Option<Personality>,
    },
    /// Camera stills plus audio, with live transcription.
    Camera {
        #[arg(long, default_value = "user")]
        facing: FacingMode,
    },
}

fn parse_line(line: &str, mode: LiveMode) -> Option<Command> {
    match line.trim().to_ascii_lowercase().as_str() {
        "" => Some(Command::Toggle(mode)),
        "start" => Some(Command::Start(mode)),
        "stop" => Some(Command::Stop),
        "switch" => Some(Command::SwitchCamera),
        "quit" | "exit" => Some(Command::Shutdown),
        _ => None,
    }
}

fn describe(state: &LiveState) -> String {
    match state {
        LiveState::Idle => "idle: press Enter to start".to_string(),
        LiveState::Connecting => "connecting...".to_string(),
        LiveState::Active => "active: listening (Enter to stop)".to_string(),
        LiveState::Error(message) => format!("error: {}", message),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("solo_live=info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    let cli = Cli::parse();
    let mut config = LiveConfig::load(cli.config.as_deref()).context("loading configuration")?;

    let mode = match cli.view {
        View::Voice { personality } => {
            if let Some(personality) = personality {
                config.personality = personality;
            }
            println!("Voice chat with {}", config.personality.name());
            LiveMode::Voice
        }
        View::Camera { facing } => {
            println!("Live camera assistant ({:?} camera)", facing);
            LiveMode::Camera(facing)
        }
    };

    let connector = Arc::new(GeminiConnector::from_config(&config));
    let devices = Arc::new(SystemDevices::from_config(&config));
    let controller = SessionController::new(config, connector, devices);

    let mut status = controller.subscribe();
    let mut transcript = controller.transcript();

    let (commands_tx, commands_rx) = mpsc::channel(16);
    let controller_task = tokio::spawn(controller.run(commands_rx));

    tokio::spawn(async move {
        println!("{}", describe(&status.borrow()));
        while status.changed().await.is_ok() {
            println!("{}", describe(&status.borrow_and_update()));
        }
    });
    tokio::spawn(async move {
        while transcript.changed().await.is_ok() {
            let text = transcript.borrow_and_update().clone();
            if !text.is_empty() {
                println!("> {}", text);
            }
        }
    });

    println!("Commands: start, stop, switch, quit. An empty line toggles.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                let _ = commands_tx.send(Command::Shutdown).await;
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else {
                    let _ = commands_tx.send(Command::Shutdown).await;
                    break;
                };
                match parse_line(&line, mode) {
                    Some(command) => {
                        let shutdown = command == Command::Shutdown;
                        if commands_tx.send(command).await.is_err() || shutdown {
                            break;
                        }
                    }
                    None => println!("unknown command '{}'", line.trim()),
                }
            }
        }
    }

    controller_task.await.context("controller task failed")?;
    Ok(())
}
