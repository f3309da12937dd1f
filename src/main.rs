use agent1::integration::{self, Settings};
use agent1::llm::{ChatSession, GeminiChatClient, GeminiClient};
use agent1::speech::{GeminiSpeaker, GeminiTranscriber, VoiceIo};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Type messages on the terminal
    Text,
    /// Speak turns through the microphone and speaker
    Voice,
    /// Full-duplex audio with the live model
    Live,
}

#[derive(Parser, Debug)]
#[command(name = "agent1", version, about = "Gemini assistant for the terminal")]
struct Cli {
    /// Interaction mode
    #[arg(long, value_enum, default_value_t = Mode::Text)]
    mode: Mode,

    /// System prompt file (SYSTEM_PROMPT_PATH takes precedence)
    #[arg(long, default_value = "config/system_prompt.txt")]
    system_prompt_path: PathBuf,
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agent1=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let code = match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    };

    // Blocking stdin reads and recordings never finish on their own
    runtime.shutdown_timeout(Duration::from_millis(200));
    code
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let settings = match Settings::from_env(Some(&cli.system_prompt_path)) {
        Ok(settings) => settings,
        Err(e) => {
            error!("{}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    info!("Starting agent1 in {:?} mode", cli.mode);
    match cli.mode {
        Mode::Text => run_text(&settings).await?,
        Mode::Voice => run_voice(&settings).await?,
        Mode::Live => {
            let controller = match integration::live_controller(&settings).await {
                Ok(controller) => controller,
                Err(e) => {
                    error!("{}", e.user_message());
                    return Ok(ExitCode::FAILURE);
                }
            };
            if let Err(e) = integration::run_live_session(&controller).await {
                error!("{}", e.user_message());
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn chat_session(settings: &Settings) -> Result<(GeminiClient, ChatSession<GeminiChatClient>)> {
    let config = settings.chat_config();
    let client = GeminiClient::new(settings.api_key.clone(), config.request_timeout)
        .context("Failed to create Gemini client")?;
    let backend =
        GeminiChatClient::new(client.clone(), config.model.clone()).with_temperature(config.temperature);
    Ok((client, ChatSession::new(backend, &config)))
}

async fn run_text(settings: &Settings) -> Result<()> {
    let (_, mut chat) = chat_session(settings)?;
    let input = tokio::io::BufReader::new(tokio::io::stdin());
    let mut output = std::io::stdout();

    tokio::select! {
        result = integration::run_text_chat(&mut chat, input, &mut output, integration::TURN_PAUSE) => {
            result.context("Text chat failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Session terminated by user.");
        }
    }
    Ok(())
}

async fn run_voice(settings: &Settings) -> Result<()> {
    let (client, mut chat) = chat_session(settings)?;
    let config = settings.voice_config();

    let recognizer = GeminiTranscriber::new(client.clone(), config.stt_model.clone(), config.language.clone());
    let synthesizer = GeminiSpeaker::new(client, config.tts_model.clone(), config.voice_name.clone());

    let mut voice = match VoiceIo::new(config, Box::new(recognizer), Box::new(synthesizer)) {
        Ok(voice) => voice,
        Err(e) => {
            error!("{}", e);
            return Ok(());
        }
    };

    tokio::select! {
        result = integration::run_voice_chat(&mut chat, &mut voice) => {
            if let Err(e) = result {
                error!("{}", e.user_message());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Session terminated by user.");
        }
    }
    Ok(())
}
