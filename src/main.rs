//! ModelScope CLI
//!
//! Chat REPL, one-shot prompts and a provider playground.

use anyhow::Result;
use clap::{Parser, Subcommand};
use modelscope::chat::STARTER_PROMPTS;
use modelscope::credentials::fingerprint;
use modelscope::playground::{find_preset, KeyStatus, PRESETS};
use modelscope::{
    AppState, ChatSession, ChatSink, Config, ConversationTurn, CredentialPool, HttpTransport,
    Playground, PlaygroundSettings, ProviderKind, ResilientClient, Role, SendOutcome, Telemetry,
    Theme, View,
};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "modelscope")]
#[command(about = "ModelScope - chat with and compare LLM providers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Provider (groq, openai, anthropic, mistral, deepseek, ...)
    #[arg(short, long, global = true)]
    provider: Option<String>,

    /// Model to use (catalog ids are mapped to API names in `run`)
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Base URL for an OpenAI-compatible server (e.g., LM Studio)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Data directory (default: $XDG_DATA_HOME/modelscope)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// OpenTelemetry collector endpoint (e.g., http://localhost:4318)
    #[arg(long, global = true)]
    otel_endpoint: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session
    Chat,

    /// Ask a single question
    Ask {
        /// The message to send
        message: String,
    },

    /// Run a prompt in the playground
    Run {
        /// User prompt (optional when --preset is given)
        prompt: Option<String>,

        /// System prompt
        #[arg(short, long)]
        system: Option<String>,

        /// Preset name (e.g. "Code Generation")
        #[arg(long)]
        preset: Option<String>,

        #[arg(short, long, default_value = "0.7")]
        temperature: f64,

        #[arg(long, default_value = "2048")]
        max_tokens: u32,

        #[arg(long, default_value = "1.0")]
        top_p: f64,

        /// Comma-separated stop sequences
        #[arg(long, default_value = "")]
        stop: String,
    },

    /// Manage stored API keys
    Keys {
        #[command(subcommand)]
        command: KeyCommands,
    },

    /// Show or change the theme preference (dark, light, toggle)
    Theme {
        value: Option<String>,
    },

    /// List supported providers
    Providers,
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Store a key for a provider
    Set { provider: String, key: String },

    /// Remove a stored key
    Remove { provider: String },

    /// Show stored keys (fingerprints only)
    List,
}

/// Prints streamed text as it grows
#[derive(Default)]
struct TerminalSink {
    printed: usize,
    errored: bool,
}

impl ChatSink for TerminalSink {
    fn append_turn(&mut self, turn: &ConversationTurn) {
        if turn.role != Role::Assistant {
            return;
        }
        if self.printed == 0 && !self.errored {
            print!("{}", turn.content);
        }
        println!();
        self.printed = 0;
        self.errored = false;
    }

    fn report_error(&mut self, message: &str) {
        if self.printed > 0 {
            println!();
        }
        eprintln!("\x1b[31m{}\x1b[0m", message);
        self.errored = true;
    }

    fn report_text(&mut self, text: &str) {
        if let Some(delta) = text.get(self.printed..) {
            print!("{}", delta);
            let _ = std::io::stdout().flush();
        }
        self.printed = text.len();
    }
}

fn build_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::from_env()?;

    if let Some(ref data_dir) = cli.data_dir {
        config = config.with_data_dir(data_dir.clone());
    }
    if let Some(ref provider) = cli.provider {
        config = config.with_provider(provider.parse().map_err(anyhow::Error::msg)?);
    }
    if let Some(ref model) = cli.model {
        config = config.with_model(model.clone());
    }
    if let Some(ref base_url) = cli.base_url {
        config = config.with_base_url(base_url.clone());
    }
    Ok(config.with_verbose(cli.verbose))
}

/// Environment keys first, then a key stored with `keys set`
fn chat_pool(config: &Config, state: &AppState) -> CredentialPool {
    let pool = CredentialPool::from_env(config.llm.key_env());
    if pool.is_empty() {
        state.pool_for(config.llm.provider)
    } else {
        pool
    }
}

fn build_session(config: &Config, state: &AppState) -> Result<ChatSession> {
    let transport = Arc::new(HttpTransport::new()?);
    let client = ResilientClient::new(config.llm.adapter(), transport);
    let pool = Arc::new(chat_pool(config, state));

    tracing::info!(
        provider = %config.llm.provider,
        model = %config.llm.model,
        keys = pool.len(),
        "Chat session ready"
    );

    Ok(ChatSession::new(client, pool, config.llm.chat_settings()))
}

/// Send one message, cancelling the stream on Ctrl+C
async fn send_with_interrupt(session: &ChatSession, line: &str, sink: &mut TerminalSink) -> SendOutcome {
    let watcher = session.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            watcher.cancel();
        }
    });

    let outcome = session.send(line, sink).await;
    ctrl_c.abort();
    outcome
}

async fn run_repl(session: ChatSession, config: &Config) -> Result<()> {
    println!("ModelScope Assistant • {} ({})", session.settings().model, config.llm.provider);
    println!("Keys loaded: {}", session.pool().len());
    println!();
    println!("Try one of:");
    for prompt in STARTER_PROMPTS {
        println!("  - {}", prompt);
    }
    println!();
    println!("Commands: /quit, /clear, /help");
    println!();

    let mut rl = DefaultEditor::new()?;
    let history_path = config.history_path();
    let _ = rl.load_history(&history_path);
    let mut sink = TerminalSink::default();

    loop {
        let prompt = if session.conversation().is_empty() {
            "you> "
        } else {
            "you>> "
        };

        match rl.readline(prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line)?;

                match line {
                    "/quit" | "/exit" => {
                        println!("Goodbye!");
                        break;
                    }
                    "/clear" => {
                        session.clear();
                        println!("History cleared.");
                        continue;
                    }
                    "/help" => {
                        println!("Commands:");
                        println!("  /quit, /exit  - Exit");
                        println!("  /clear        - Clear chat history");
                        println!("  /help         - Show this");
                        println!("Ctrl+C while an answer streams stops it.");
                        continue;
                    }
                    _ if line.starts_with('/') => {
                        println!("Unknown command: {}", line);
                        continue;
                    }
                    _ => {}
                }

                match send_with_interrupt(&session, line, &mut sink).await {
                    SendOutcome::Cancelled => {
                        println!("\x1b[33m⚠ Cancelled\x1b[0m");
                    }
                    SendOutcome::Completed(report) => {
                        tracing::debug!(
                            attempts = report.attempts.len(),
                            elapsed_ms = report.elapsed.as_millis() as u64,
                            "Answer complete"
                        );
                    }
                    _ => {}
                }
                println!();
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(e) => {
                eprintln!("Error: {:?}", e);
                break;
            }
        }
    }

    let _ = rl.save_history(&history_path);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_playground(
    config: &Config,
    state: &mut AppState,
    prompt: Option<String>,
    system: Option<String>,
    preset: Option<String>,
    temperature: f64,
    max_tokens: u32,
    top_p: f64,
    stop: String,
) -> Result<u8> {
    let mut settings = PlaygroundSettings {
        provider: config.llm.provider,
        model_id: config.llm.model.clone(),
        temperature,
        max_tokens,
        top_p,
        stop_sequences: stop,
        ..Default::default()
    };

    if let Some(name) = preset {
        let preset = find_preset(&name).ok_or_else(|| {
            let names: Vec<&str> = PRESETS.iter().map(|p| p.name).collect();
            anyhow::anyhow!("Unknown preset '{}'. Available: {}", name, names.join(", "))
        })?;
        settings.apply_preset(preset);
    }
    if let Some(system) = system {
        settings.system_prompt = system;
    }
    if let Some(prompt) = prompt {
        settings.user_prompt = prompt;
    }

    let pool = state.pool_for(settings.provider);
    let mut playground = Playground::new(Arc::new(HttpTransport::new()?));
    if config.llm.base_url.is_some() {
        playground = playground.with_endpoint(config.llm.adapter().endpoint);
    }

    println!(
        "Calling {} API ({})...",
        settings.provider.display_name(),
        settings.api_model()
    );

    let mut printed = 0;
    let result = playground
        .run(
            &settings,
            &pool,
            |text| {
                if let Some(delta) = text.get(printed..) {
                    print!("{}", delta);
                    let _ = std::io::stdout().flush();
                }
                printed = text.len();
            },
            &CancellationToken::new(),
        )
        .await;

    state.set_view(View::Playground);
    let status = state.record_run(settings.provider, result.is_ok());
    match result {
        Ok(result) => {
            println!();
            println!();
            println!(
                "\x1b[2m{:.2}s • Model: {} • Provider: {}\x1b[0m",
                result.elapsed.as_secs_f64(),
                result.model,
                result.provider.display_name()
            );
            Ok(0)
        }
        Err(e) => {
            if printed > 0 {
                println!();
            }
            eprintln!("\x1b[31m{}\x1b[0m", e.user_message());
            if status == KeyStatus::Invalid {
                eprintln!(
                    "Stored {} key marked invalid",
                    settings.provider.display_name()
                );
            }
            tracing::warn!(error = %e, "Playground run failed");
            Ok(1)
        }
    }
}

fn run_keys(command: KeyCommands, state: &mut AppState) -> Result<()> {
    match command {
        KeyCommands::Set { provider, key } => {
            let provider: ProviderKind = provider.parse().map_err(anyhow::Error::msg)?;
            let status = KeyStatus::for_key(&key);
            state.set_key(provider, &key);
            println!("Stored {} key ({:?})", provider.display_name(), status);
            if status != KeyStatus::Valid {
                println!(
                    "Key looks too short. Expected something like {} (from {})",
                    provider.key_placeholder(),
                    provider.console_url()
                );
            }
        }
        KeyCommands::Remove { provider } => {
            let provider: ProviderKind = provider.parse().map_err(anyhow::Error::msg)?;
            state.set_key(provider, "");
            println!("Removed {} key", provider.display_name());
        }
        KeyCommands::List => {
            if state.provider_keys.is_empty() {
                println!("No stored keys.");
            }
            for (provider, key) in &state.provider_keys {
                println!(
                    "{:<10} {:<16} {:?}",
                    provider.as_str(),
                    fingerprint(key),
                    state.key_status(*provider)
                );
            }
        }
    }
    Ok(())
}

fn run_theme(value: Option<String>, state: &mut AppState) -> Result<()> {
    match value.as_deref() {
        None => {}
        Some("toggle") => {
            state.toggle_theme();
        }
        Some(other) => {
            let theme: Theme = other.parse().map_err(anyhow::Error::msg)?;
            state.set_theme(theme);
        }
    }
    println!("Theme: {}", state.theme);
    Ok(())
}

fn list_providers() {
    println!(
        "{:<10} {:<18} {:<18} {}",
        "ID", "NAME", "KEY ENV", "ENDPOINT"
    );
    for kind in ProviderKind::ALL {
        println!(
            "{:<10} {:<18} {:<18} {}",
            kind.as_str(),
            kind.display_name(),
            kind.key_env(),
            kind.default_endpoint()
        );
    }
}

/// Exit status for a one-shot send; the sink has already shown any error
fn ask_exit_code(outcome: &SendOutcome) -> u8 {
    match outcome {
        SendOutcome::Failed(_) => 1,
        SendOutcome::Cancelled => 130,
        _ => 0,
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = build_config(&cli)?;

    let _telemetry = Telemetry::init(&config.telemetry, cli.otel_endpoint.as_deref())?;

    let state_path = config.state_path();
    let mut state = AppState::load_from(&state_path);

    let result = match cli.command {
        None | Some(Commands::Chat) => {
            state.set_view(View::Chat);
            state.save_to(&state_path)?;
            let session = build_session(&config, &state)?;
            run_repl(session, &config).await.map(|_| 0)
        }
        Some(Commands::Ask { message }) => {
            let session = build_session(&config, &state)?;
            let mut sink = TerminalSink::default();
            let outcome = send_with_interrupt(&session, &message, &mut sink).await;
            if let SendOutcome::Failed(ref e) = outcome {
                tracing::warn!(error = %e, "Ask failed");
            }
            Ok(ask_exit_code(&outcome))
        }
        Some(Commands::Run {
            prompt,
            system,
            preset,
            temperature,
            max_tokens,
            top_p,
            stop,
        }) => {
            let result = run_playground(
                &config, &mut state, prompt, system, preset, temperature, max_tokens, top_p, stop,
            )
            .await;
            state.save_to(&state_path)?;
            result
        }
        Some(Commands::Keys { command }) => {
            run_keys(command, &mut state)?;
            state.save_to(&state_path).map(|_| 0)
        }
        Some(Commands::Theme { value }) => {
            run_theme(value, &mut state)?;
            state.save_to(&state_path).map(|_| 0)
        }
        Some(Commands::Providers) => {
            list_providers();
            Ok(0)
        }
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }
    result.map(ExitCode::from)
}
