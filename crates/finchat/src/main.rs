//! Terminal chat with an OpenRouter model that can look up market data.

#[macro_use]
extern crate tracing;

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use finchat::trace::TraceRecorder;
use finchat::{DEFAULT_SYSTEM_PROMPT, Session, SessionBuilder};
use finchat_bridge::{Bridge, BridgeConfig};
use finchat_core::{AgentEvent, Error, RetryPolicy, Transcript};
use finchat_model::ErrorKind as ModelErrorKind;
use finchat_openrouter::{OpenRouterConfigBuilder, OpenRouterProvider};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt};
use tokio::select;
use tokio::sync::mpsc::{self, UnboundedReceiver};

const BAR_CHAR: &str = "▎";
const DEFAULT_BRIDGE_COMMAND: &str = "python3 yfinance_service.py";

/// OpenRouter terminal chat with financial data tools.
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Run a single prompt and exit instead of interactive mode.
    #[arg(long, conflicts_with = "prompt_arg")]
    prompt: Option<String>,

    /// Same as `--prompt`.
    #[arg(value_name = "PROMPT")]
    prompt_arg: Option<String>,

    /// System prompt.
    #[arg(
        long,
        default_value = DEFAULT_SYSTEM_PROMPT,
        hide_default_value = true
    )]
    system: String,

    /// OpenRouter API key.
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// OpenRouter model identifier [default: openai/gpt-5].
    #[arg(long, env = "OPENROUTER_MODEL")]
    model: Option<String>,

    /// OpenRouter API base URL [default: https://openrouter.ai/api/v1].
    #[arg(long, env = "OPENROUTER_BASE_URL")]
    base_url: Option<String>,

    /// Site URL sent as `HTTP-Referer` for app attribution.
    #[arg(long, env = "OPENROUTER_SITE_URL")]
    site_url: Option<String>,

    /// App name sent as `X-Title` for app attribution.
    #[arg(long, env = "OPENROUTER_APP_NAME")]
    app_name: Option<String>,

    /// Organization sent as `X-OpenRouter-Org`.
    #[arg(long, env = "OPENROUTER_ORG")]
    org: Option<String>,

    /// Request timeout in seconds.
    #[arg(long, default_value = "60", value_parser = parse_seconds)]
    timeout: Duration,

    /// Command line starting the data-fetch service.
    #[arg(
        long,
        env = "FINCHAT_BRIDGE_COMMAND",
        default_value = DEFAULT_BRIDGE_COMMAND
    )]
    bridge_command: String,

    /// Directory the data-fetch service runs in.
    #[arg(long, env = "FINCHAT_BRIDGE_DIR")]
    bridge_dir: Option<PathBuf>,

    /// Data-fetch timeout in seconds.
    #[arg(long, default_value = "15", value_parser = parse_seconds)]
    bridge_timeout: Duration,

    /// Maximum number of model calls per message.
    #[arg(long, default_value_t = 16)]
    max_turns: usize,

    /// Do not retry rate-limited model calls.
    #[arg(long)]
    no_retry: bool,

    /// Stream assistant tokens live to the terminal.
    #[arg(long)]
    live_stream: bool,

    /// Print tool outputs and diagnostics.
    #[arg(long)]
    verbose: bool,

    /// Capture and display per-message timing diagnostics.
    #[arg(long)]
    trace: bool,

    /// Width of timing bars when `--trace` is enabled.
    #[arg(long, default_value_t = 32)]
    trace_width: usize,

    /// Write the conversation to this file when done.
    #[arg(long)]
    save_transcript: Option<PathBuf>,

    /// Resume the conversation saved in this file.
    #[arg(long)]
    load_transcript: Option<PathBuf>,
}

enum UiEvent {
    Delta(String),
    Agent(AgentEvent),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Existing variables win over the `.env` file.
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let Some(api_key) = cli.api_key.clone().filter(|key| !key.is_empty())
    else {
        eprintln!("OPENROUTER_API_KEY environment variable is required.");
        return ExitCode::FAILURE;
    };

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let mut session = match build_session(&cli, api_key, event_tx) {
        Ok(session) => session,
        Err(message) => {
            eprintln!("{} {message}", "error:".bright_red().bold());
            return ExitCode::FAILURE;
        }
    };

    let mut ui = Ui::new(&cli, event_rx);
    let prompt = cli.prompt.clone().or_else(|| cli.prompt_arg.clone());
    let code = match prompt {
        Some(prompt) => match ui.send(&mut session, &prompt).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => report_error(&err),
        },
        None => {
            interactive_loop(&mut session, &mut ui).await;
            ExitCode::SUCCESS
        }
    };

    if let Some(path) = &cli.save_transcript {
        if let Err(message) = save_transcript(session.transcript(), path) {
            eprintln!("{} {message}", "error:".bright_red().bold());
            return ExitCode::FAILURE;
        }
    }
    code
}

fn build_session(
    cli: &Cli,
    api_key: String,
    event_tx: mpsc::UnboundedSender<UiEvent>,
) -> Result<Session, String> {
    let mut config_builder = OpenRouterConfigBuilder::with_api_key(api_key)
        .with_streaming(true)
        .with_timeout(cli.timeout);
    if let Some(model) = &cli.model {
        config_builder = config_builder.with_model(model);
    }
    if let Some(base_url) = &cli.base_url {
        config_builder = config_builder.with_base_url(base_url);
    }
    for (name, value) in [
        ("HTTP-Referer", &cli.site_url),
        ("X-Title", &cli.app_name),
        ("X-OpenRouter-Org", &cli.org),
    ] {
        if let Some(value) = value.as_ref().filter(|value| !value.is_empty()) {
            config_builder = config_builder.with_header(name, value);
        }
    }
    let config = config_builder.build();
    debug!("using {config:?}");
    let model_provider =
        OpenRouterProvider::new(config).map_err(|err| err.to_string())?;

    let mut bridge_config =
        BridgeConfig::from_command_line(&cli.bridge_command)
            .ok_or("the bridge command is empty")?
            .with_timeout(cli.bridge_timeout);
    if let Some(dir) = &cli.bridge_dir {
        bridge_config = bridge_config.with_working_dir(dir);
    }

    let mut builder = SessionBuilder::with_model_provider(model_provider)
        .with_bridge(Bridge::new(bridge_config))
        .with_system_prompt(cli.system.clone())
        .with_max_turns(cli.max_turns)
        .on_delta({
            let event_tx = event_tx.clone();
            move |delta| {
                event_tx.send(UiEvent::Delta(delta.to_owned())).ok();
            }
        })
        .on_event(move |event| {
            event_tx.send(UiEvent::Agent(event)).ok();
        });
    if cli.no_retry {
        builder = builder.with_retry_policy(RetryPolicy::Never);
    }
    if let Some(path) = &cli.load_transcript {
        builder = builder.with_transcript(load_transcript(path)?);
    }
    Ok(builder.build())
}

async fn interactive_loop(session: &mut Session, ui: &mut Ui) {
    println!("OpenRouter chat started. Type 'exit' or 'quit' to stop.");
    if ui.verbose {
        let names: Vec<_> = session
            .agent()
            .registry()
            .definitions()
            .into_iter()
            .map(|tool| tool.name)
            .collect();
        println!("Loaded tools: {}", names.join(", "));
    }

    loop {
        print!("{} ", ">".bright_green().bold());
        std::io::stdout().flush().ok();

        let Some(line) = read_line().await else {
            println!("\nSession ended.");
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if ["exit", "quit"]
            .iter()
            .any(|command| line.eq_ignore_ascii_case(command))
        {
            println!("Session ended.");
            break;
        }

        // The session drops a failed message, so just report it.
        if let Err(err) = ui.send(session, line).await {
            report_error(&err);
        }
    }
}

struct Ui {
    live_stream: bool,
    verbose: bool,
    trace: Option<TraceRecorder>,
    trace_width: usize,
    event_rx: UnboundedReceiver<UiEvent>,
    progress_style: ProgressStyle,
    progress_bar: Option<ProgressBar>,
    streamed: bool,
}

impl Ui {
    fn new(cli: &Cli, event_rx: UnboundedReceiver<UiEvent>) -> Self {
        let progress_style =
            ProgressStyle::with_template("{spinner} {wide_msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        Self {
            live_stream: cli.live_stream,
            verbose: cli.verbose,
            trace: cli.trace.then(TraceRecorder::new),
            trace_width: cli.trace_width,
            event_rx,
            progress_style,
            progress_bar: None,
            streamed: false,
        }
    }

    async fn send(
        &mut self,
        session: &mut Session,
        message: &str,
    ) -> Result<(), Error> {
        if let Some(trace) = &mut self.trace {
            *trace = TraceRecorder::new();
        }
        self.streamed = false;
        self.start_progress();

        let run = session.send_message(message);
        tokio::pin!(run);
        let result = loop {
            select! {
                result = &mut run => break result,
                Some(event) = self.event_rx.recv() => self.handle_event(event),
            }
        };
        while let Ok(event) = self.event_rx.try_recv() {
            self.handle_event(event);
        }
        self.finish_progress();

        let answer = result?;
        let emit_started = Instant::now();
        if self.streamed {
            println!();
        } else {
            println!(
                "{}🤖 {}",
                BAR_CHAR.bright_cyan(),
                answer.bright_white()
            );
        }
        if let Some(trace) = &mut self.trace {
            trace.add("assistant_emit", emit_started.elapsed(), vec![]);
            println!("{}", trace.report(self.trace_width, false).dimmed());
        }
        Ok(())
    }

    fn handle_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::Delta(delta) => {
                if !self.live_stream {
                    return;
                }
                if !self.streamed {
                    self.finish_progress();
                    print!("{}🤖 ", BAR_CHAR.bright_cyan());
                    self.streamed = true;
                }
                print!("{}", delta.bright_white());
                std::io::stdout().flush().ok();
            }
            UiEvent::Agent(event) => {
                if let Some(trace) = &mut self.trace {
                    trace.record_event(&event);
                }
                if let AgentEvent::ToolFinished {
                    name,
                    arguments,
                    result,
                    elapsed,
                    ..
                } = &event
                {
                    if self.streamed {
                        // Text streamed before the tool call ends here.
                        println!();
                        self.streamed = false;
                    }
                    self.print_tool(
                        name,
                        arguments,
                        &result.to_content(),
                        *elapsed,
                        result.is_ok(),
                    );
                    self.start_progress();
                }
            }
        }
    }

    fn print_tool(
        &self,
        name: &str,
        arguments: &str,
        content: &str,
        elapsed: Duration,
        ok: bool,
    ) {
        if !self.verbose {
            if let Some(progress_bar) = &self.progress_bar {
                progress_bar.set_message(format!("🔧 {name}..."));
            }
            return;
        }
        let line = format!(
            "{}🔧 {name}({arguments}) in {:.3}s",
            BAR_CHAR.bright_yellow(),
            elapsed.as_secs_f64()
        );
        let print = || {
            println!("{line}");
            let bar = BAR_CHAR.bright_yellow();
            if ok {
                println!("{bar}{}", content.dimmed());
            } else {
                println!("{bar}{}", content.bright_red());
            }
        };
        match &self.progress_bar {
            Some(progress_bar) => progress_bar.suspend(print),
            None => print(),
        }
    }

    fn start_progress(&mut self) {
        if self.live_stream && self.streamed {
            return;
        }
        self.progress_bar.get_or_insert_with(|| {
            let progress_bar = ProgressBar::new_spinner();
            progress_bar.set_style(self.progress_style.clone());
            progress_bar.set_message("🤔 Thinking...");
            progress_bar.enable_steady_tick(Duration::from_millis(100));
            progress_bar
        });
    }

    fn finish_progress(&mut self) {
        if let Some(progress_bar) = self.progress_bar.take() {
            progress_bar.finish_and_clear();
        }
    }
}

async fn read_line() -> Option<String> {
    let mut stdin = io::BufReader::new(io::stdin());
    let mut line = String::new();

    match stdin.read_line(&mut line).await {
        Ok(count) => {
            if count == 0 {
                return None;
            }
            Some(line)
        }
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}

fn report_error(err: &Error) -> ExitCode {
    let (label, code) = match err.model_error_kind() {
        Some(ModelErrorKind::Transport) => ("Network error:", 2),
        Some(
            ModelErrorKind::Http
            | ModelErrorKind::RateLimitExceeded
            | ModelErrorKind::MalformedResponse,
        ) => ("HTTP error:", 2),
        Some(ModelErrorKind::Other) | None => ("Error:", 1),
    };
    eprintln!("{} {err}", label.bright_red().bold());
    ExitCode::from(code)
}

fn parse_seconds(value: &str) -> Result<Duration, String> {
    let seconds: f64 = value
        .parse()
        .map_err(|_| format!("`{value}` is not a number of seconds"))?;
    Duration::try_from_secs_f64(seconds).map_err(|err| err.to_string())
}

fn load_transcript(path: &Path) -> Result<Transcript, String> {
    let json = std::fs::read_to_string(path)
        .map_err(|err| format!("failed to read {}: {err}", path.display()))?;
    Transcript::from_json(&json)
        .map_err(|err| format!("failed to load {}: {err}", path.display()))
}

fn save_transcript(transcript: &Transcript, path: &Path) -> Result<(), String> {
    let json = transcript.to_json().map_err(|err| err.to_string())?;
    std::fs::write(path, json)
        .map_err(|err| format!("failed to write {}: {err}", path.display()))
}
