//! rcmd - remote command relay
//!
//! The main entry point, handling:
//! - the machine-side agent loop
//! - the operator-side machine list and command submission
//! - chat rooms on the shared store
//! - configuration inspection

use clap::{Args, Parser, Subcommand};
use rcmd_common::error::{format_error_human, StructuredError};
use rcmd_common::{Error, MachineId, OutputFormat};
use rcmd_config::{load_settings, ConfigError, LoadedSettings, Settings};
use rcmd_core::agent::{detect_machine_id, Agent, AgentConfig, StopToken};
use rcmd_core::chat::{self, ChatMessage, ChatRooms};
use rcmd_core::controller::{LivenessMonitor, SubmitOutcome, Submitter};
use rcmd_core::exec::{
    Command, Dispatcher, ExecutionStatus, HeadlessLauncher, Launcher, ProcessRunner,
    SystemLauncher,
};
use rcmd_core::exit_codes::ExitCode;
use rcmd_core::log_event;
use rcmd_core::logging::{
    event_names, generate_run_id, init_logging, LogConfig, LogContext, Stage,
};
use rcmd_core::store::{HttpStore, Store, Watcher};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Relay shell-level commands to remote machines through a shared store
#[derive(Parser)]
#[command(name = "rcmd")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Path to rcmd.toml (default: RCMD_CONFIG, XDG config dir, /etc/rcmd)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "human")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the machine-side agent loop
    Agent(AgentArgs),

    /// List machines and their liveness
    Machines(MachinesArgs),

    /// Submit a command to a machine and wait for its result
    Send(SendArgs),

    /// Parse a command line locally and print the result
    Parse(ParseArgs),

    /// Chat rooms on the shared store
    Chat(ChatArgs),

    /// Configuration management
    Config(ConfigArgs),

    /// Print version information
    Version,
}

#[derive(Args, Debug)]
struct AgentArgs {
    /// Machine id to publish under (default: agent.machine_id, then host name)
    #[arg(long)]
    machine_id: Option<String>,

    /// Run a single cycle and exit
    #[arg(long, conflicts_with = "max_cycles")]
    once: bool,

    /// Exit after this many cycles
    #[arg(long)]
    max_cycles: Option<u64>,

    /// Fail desktop actions instead of launching programs
    #[arg(long)]
    headless: bool,
}

#[derive(Args, Debug)]
struct MachinesArgs {
    /// Include offline machines
    #[arg(long)]
    all: bool,

    /// Keep refreshing at controller.refresh_interval_secs
    #[arg(long)]
    watch: bool,

    /// Preferred selection, kept while it stays online
    #[arg(long)]
    select: Option<String>,
}

#[derive(Args, Debug)]
struct SendArgs {
    /// Target machine id
    machine: String,

    /// Command line to run (joined with spaces)
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,

    /// Result polls before giving up (default: controller.poll_attempts)
    #[arg(long)]
    attempts: Option<u32>,

    /// Seconds between result polls (default: controller.poll_interval_secs)
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Submit even if the machine is not currently online
    #[arg(long)]
    force: bool,
}

#[derive(Args, Debug)]
struct ParseArgs {
    /// Raw command line
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    line: Vec<String>,
}

#[derive(Args, Debug)]
struct ChatArgs {
    /// Room id
    room: String,

    /// Post a message
    #[arg(long)]
    say: Option<String>,

    /// Keep printing new messages until interrupted
    #[arg(long)]
    follow: bool,

    /// Sender name for --say
    #[arg(long, default_value = "admin")]
    sender: String,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate the configuration and report where it came from
    Check,
}

// ============================================================================
// Main entry point
// ============================================================================

fn main() {
    let cli = Cli::parse();

    init_logging(&LogConfig::from_env(
        cli.global.verbose,
        cli.global.quiet,
        cli.global.format.is_machine(),
    ));

    let exit_code = match &cli.command {
        Commands::Agent(args) => run_agent(&cli.global, args),
        Commands::Machines(args) => run_machines(&cli.global, args),
        Commands::Send(args) => run_send(&cli.global, args),
        Commands::Parse(args) => run_parse(&cli.global, args),
        Commands::Chat(args) => run_chat(&cli.global, args),
        Commands::Config(args) => run_config(&cli.global, args),
        Commands::Version => {
            print_version(&cli.global);
            ExitCode::Clean
        }
    };

    std::process::exit(exit_code.as_i32());
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Load settings or report the config error and return its exit code.
fn settings(global: &GlobalOpts, ctx: &LogContext) -> Result<LoadedSettings, ExitCode> {
    match load_settings(global.config.as_deref()) {
        Ok(loaded) => {
            log_event!(ctx, DEBUG, event_names::CONFIG_LOADED, Stage::Init,
                "configuration loaded",
                source = %loaded.source,
                path = ?loaded.path,
                store = %loaded.settings.store.url);
            Ok(loaded)
        }
        Err(e) => Err(output_config_error(global, &e)),
    }
}

fn store(settings: &Settings) -> HttpStore {
    HttpStore::from_settings(&settings.store)
}

fn use_color(global: &GlobalOpts) -> bool {
    !global.no_color && std::io::stderr().is_terminal()
}

/// Report an error in the selected format and map it to an exit code.
fn output_error(global: &GlobalOpts, err: &Error) -> ExitCode {
    match global.format {
        OutputFormat::Json => eprintln!("{}", StructuredError::from(err).to_json()),
        OutputFormat::Summary => eprintln!("error {}: {}", err.code(), err),
        OutputFormat::Exitcode => {}
        OutputFormat::Human => eprintln!("{}", format_error_human(err, use_color(global))),
    }
    ExitCode::from(err)
}

fn output_config_error(global: &GlobalOpts, error: &ConfigError) -> ExitCode {
    let (code, exit_code) = match error {
        ConfigError::NotFound { .. } => (10, ExitCode::ArgsError),
        ConfigError::ParseError { .. } => (10, ExitCode::ConfigError),
        ConfigError::Invalid(e) => (e.code(), ExitCode::ConfigError),
        ConfigError::IoError { .. } => (60, ExitCode::IoError),
    };

    match global.format {
        OutputFormat::Json => {
            let response = serde_json::json!({
                "status": "error",
                "error": { "code": code, "message": error.to_string() },
            });
            eprintln!("{}", response);
        }
        OutputFormat::Summary => eprintln!("config error: {}", error),
        OutputFormat::Exitcode => {}
        OutputFormat::Human => {
            eprintln!("# Configuration Error");
            eprintln!();
            eprintln!("Error: {}", error);
        }
    }
    exit_code
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(_) => println!("{}", value),
    }
}

/// Stop token that trips on Ctrl-C.
fn interrupt_token() -> StopToken {
    let token = StopToken::new();
    interrupt::install(token.clone());
    token
}

#[cfg(unix)]
mod interrupt {
    use rcmd_core::agent::StopToken;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    static INTERRUPTED: AtomicBool = AtomicBool::new(false);

    extern "C" fn on_sigint(_: libc::c_int) {
        INTERRUPTED.store(true, Ordering::SeqCst);
    }

    /// Forward SIGINT/SIGTERM to `token`. The handler only flips an atomic;
    /// a watcher thread does the rest outside signal context.
    pub fn install(token: StopToken) {
        // SAFETY: the handler only performs an atomic store.
        unsafe {
            libc::signal(libc::SIGINT, on_sigint as *const () as libc::sighandler_t);
            libc::signal(libc::SIGTERM, on_sigint as *const () as libc::sighandler_t);
        }
        std::thread::spawn(move || loop {
            if INTERRUPTED.load(Ordering::SeqCst) {
                token.stop();
                return;
            }
            if token.sleep(Duration::from_millis(200)) {
                return;
            }
        });
    }
}

#[cfg(not(unix))]
mod interrupt {
    use rcmd_core::agent::StopToken;

    /// Default console handling terminates the process on Ctrl-C.
    pub fn install(_token: StopToken) {}
}

// ============================================================================
// agent
// ============================================================================

fn run_agent(global: &GlobalOpts, args: &AgentArgs) -> ExitCode {
    let run_id = generate_run_id();
    let boot_ctx = LogContext::new(run_id.clone(), "-");
    let loaded = match settings(global, &boot_ctx) {
        Ok(l) => l,
        Err(code) => return code,
    };
    let settings = loaded.settings;

    let configured = args
        .machine_id
        .as_deref()
        .unwrap_or(&settings.agent.machine_id);
    let machine_id = match detect_machine_id(configured) {
        Ok(id) => id,
        Err(e) => return output_error(global, &e),
    };

    let mut config = AgentConfig::from_settings(&settings.agent);
    config.max_cycles = if args.once { Some(1) } else { args.max_cycles };

    let store = Arc::new(store(&settings));
    let stop = interrupt_token();

    let stats = if args.headless {
        run_agent_with(store, machine_id, HeadlessLauncher, config, &settings, run_id, &stop)
    } else {
        run_agent_with(store, machine_id, SystemLauncher, config, &settings, run_id, &stop)
    };

    match global.format {
        OutputFormat::Json => print_json(&serde_json::json!({ "status": "stopped", "stats": stats })),
        OutputFormat::Summary => println!(
            "cycles={} executed={} failed={} store_errors={}",
            stats.cycles, stats.executed, stats.failed, stats.store_errors
        ),
        _ => {}
    }
    ExitCode::Clean
}

fn run_agent_with<L: Launcher>(
    store: Arc<HttpStore>,
    machine_id: MachineId,
    launcher: L,
    config: AgentConfig,
    settings: &Settings,
    run_id: String,
    stop: &StopToken,
) -> rcmd_core::agent::AgentStats {
    let chat = Arc::new(ChatRooms::new(Arc::clone(&store), machine_id.clone()));
    let dispatcher = Dispatcher::new(machine_id.clone(), launcher, chat.clone())
        .with_runner(ProcessRunner::new(settings.runner.max_output_bytes));
    let mut agent = Agent::new(store, machine_id, dispatcher, config, run_id);
    let stats = agent.run(stop);
    chat.close_all();
    stats
}

// ============================================================================
// machines
// ============================================================================

fn run_machines(global: &GlobalOpts, args: &MachinesArgs) -> ExitCode {
    let run_id = generate_run_id();
    let loaded = match settings(global, &LogContext::new(run_id.clone(), "-")) {
        Ok(l) => l,
        Err(code) => return code,
    };
    let controller = &loaded.settings.controller;
    let mut monitor = LivenessMonitor::new(store(&loaded.settings), controller.online_timeout(), run_id);
    let stop = if args.watch { interrupt_token() } else { StopToken::new() };

    loop {
        let now = chrono::Utc::now();
        match monitor.refresh(now).map(|online| online.to_vec()) {
            Ok(online) => {
                if let Some(preferred) = &args.select {
                    monitor.selection_mut().select(preferred, &online);
                }
                print_machines(global, &monitor, now, args.all);
            }
            Err(e) if args.watch => {
                // Watching: a flaky store should not end the session.
                let _ = output_error(global, &e);
            }
            Err(e) => return output_error(global, &e),
        }

        if !args.watch || stop.sleep(controller.refresh_interval()) {
            break;
        }
    }
    ExitCode::Clean
}

fn print_machines<S: Store>(
    global: &GlobalOpts,
    monitor: &LivenessMonitor<S>,
    now: chrono::DateTime<chrono::Utc>,
    all: bool,
) {
    let timeout = monitor.timeout();
    let selected = monitor.selection().selected();
    let rows: Vec<_> = monitor
        .records()
        .iter()
        .filter(|r| all || r.is_online(now, timeout))
        .collect();

    match global.format {
        OutputFormat::Json => {
            let machines: Vec<serde_json::Value> = rows
                .iter()
                .map(|r| {
                    serde_json::json!({
                        "id": r.id,
                        "online": r.is_online(now, timeout),
                        "last_seen": r.last_seen.map(|t| t.to_rfc3339()),
                        "age_secs": r.age_secs(now),
                        "pending_cmd": r.cmd,
                        "selected": selected == Some(r.id.as_str()),
                    })
                })
                .collect();
            print_json(&serde_json::json!({
                "generated_at": now.to_rfc3339(),
                "online_timeout_secs": timeout.as_secs(),
                "selected": selected,
                "machines": machines,
            }));
        }
        OutputFormat::Summary => {
            println!(
                "{} online, selected={}",
                monitor.online().len(),
                selected.unwrap_or("-")
            );
        }
        OutputFormat::Exitcode => {}
        OutputFormat::Human => {
            if rows.is_empty() {
                println!("No machines online.");
                return;
            }
            for r in rows {
                let mark = if selected == Some(r.id.as_str()) { '*' } else { ' ' };
                let state = if r.is_online(now, timeout) { "online" } else { "offline" };
                let age = r
                    .age_secs(now)
                    .map_or_else(|| "never".to_string(), |s| format!("{}s ago", s));
                println!("{} {:<24} {:<8} {}", mark, r.id, state, age);
            }
        }
    }
}

// ============================================================================
// send
// ============================================================================

fn run_send(global: &GlobalOpts, args: &SendArgs) -> ExitCode {
    let run_id = generate_run_id();
    let loaded = match settings(global, &LogContext::new(run_id.clone(), args.machine.as_str())) {
        Ok(l) => l,
        Err(code) => return code,
    };
    let controller = &loaded.settings.controller;

    let Some(machine) = MachineId::new(&args.machine) else {
        let err = Error::MalformedCommand(format!("invalid machine id: {:?}", args.machine));
        return output_error(global, &err);
    };
    let line = args.command.join(" ");
    let store = store(&loaded.settings);

    if !args.force {
        let mut monitor = LivenessMonitor::new(&store, controller.online_timeout(), run_id.clone());
        match monitor.refresh(chrono::Utc::now()) {
            Ok(online) if online.iter().any(|m| m == machine.as_str()) => {}
            Ok(_) => {
                eprintln!(
                    "{} is not online (no heartbeat within {}s); use --force to submit anyway",
                    machine,
                    controller.online_timeout_secs
                );
                return ExitCode::MachineOffline;
            }
            Err(e) => return output_error(global, &e),
        }
    }

    let submitter = Submitter::new(&store, run_id);
    let handle = match submitter.submit(&machine, &line) {
        Ok(h) => h,
        Err(e) => return output_error(global, &e),
    };

    let attempts = args.attempts.unwrap_or(controller.poll_attempts);
    let interval = args
        .interval_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| controller.poll_interval());
    let stop = interrupt_token();

    let outcome = match handle.await_result(attempts, interval, &stop) {
        Ok(o) => o,
        Err(e) => return output_error(global, &e),
    };
    stop.stop();

    match outcome {
        SubmitOutcome::Completed(text) => {
            let status = ExecutionStatus::of_text(&text);
            match global.format {
                OutputFormat::Json => print_json(&serde_json::json!({
                    "machine": machine,
                    "command": line,
                    "status": status,
                    "result": text,
                })),
                OutputFormat::Summary => println!(
                    "{}: {}",
                    machine,
                    text.lines().next().unwrap_or_default()
                ),
                OutputFormat::Exitcode => {}
                OutputFormat::Human => println!("{}", text),
            }
            match status {
                Some(ExecutionStatus::Fail) => ExitCode::RemoteFail,
                _ => ExitCode::Clean,
            }
        }
        SubmitOutcome::Cancelled => {
            eprintln!("Stopped waiting; the command stays queued on {}.", machine);
            ExitCode::Interrupted
        }
        timeout @ SubmitOutcome::Timeout { .. } => match timeout.into_result(&machine) {
            Err(e) => output_error(global, &e),
            Ok(_) => ExitCode::TimeoutError,
        },
    }
}

// ============================================================================
// parse
// ============================================================================

fn run_parse(global: &GlobalOpts, args: &ParseArgs) -> ExitCode {
    let line = args.line.join(" ");
    match Command::parse(&line) {
        Ok(command) => {
            match global.format {
                OutputFormat::Exitcode => {}
                OutputFormat::Summary => println!("{}", command.verb()),
                _ => match serde_json::to_value(&command) {
                    Ok(value) => print_json(&value),
                    Err(e) => return output_error(global, &Error::Json(e)),
                },
            }
            ExitCode::Clean
        }
        Err(e) => output_error(global, &e),
    }
}

// ============================================================================
// chat
// ============================================================================

fn run_chat(global: &GlobalOpts, args: &ChatArgs) -> ExitCode {
    let run_id = generate_run_id();
    let loaded = match settings(global, &LogContext::new(run_id, "-")) {
        Ok(l) => l,
        Err(code) => return code,
    };
    let store = Arc::new(store(&loaded.settings));

    if let Some(text) = &args.say {
        let message = ChatMessage::new(args.sender.as_str(), text);
        if let Err(e) = chat::send(&store, &args.room, &message) {
            return output_error(global, &e);
        }
    }

    if !args.follow {
        let history = match chat::history(&store, &args.room) {
            Ok(h) => h,
            Err(e) => return output_error(global, &e),
        };
        match global.format {
            OutputFormat::Json => match serde_json::to_value(&history) {
                Ok(value) => print_json(&value),
                Err(e) => return output_error(global, &Error::Json(e)),
            },
            OutputFormat::Exitcode => {}
            _ => {
                for message in &history {
                    println!("{}\n", message);
                }
            }
        }
        return ExitCode::Clean;
    }

    let path = rcmd_core::store::paths::chat_messages(args.room.trim());
    let mut watcher = Watcher::new(path);
    let stop = interrupt_token();
    loop {
        match watcher.poll(&store) {
            Ok(events) => {
                for event in events {
                    if let Ok(message) = serde_json::from_value::<ChatMessage>(event.value) {
                        println!("{}\n", message);
                    }
                }
            }
            Err(e) => {
                let _ = output_error(global, &Error::from(e));
            }
        }
        if stop.sleep(chat::FOLLOW_INTERVAL) {
            break;
        }
    }
    ExitCode::Clean
}

// ============================================================================
// config
// ============================================================================

fn run_config(global: &GlobalOpts, args: &ConfigArgs) -> ExitCode {
    let ctx = LogContext::new(generate_run_id(), "-");
    let loaded = match settings(global, &ctx) {
        Ok(l) => l,
        Err(code) => return code,
    };
    let path = loaded.path.as_ref().map(|p| p.display().to_string());

    match args.command {
        ConfigCommands::Show => match global.format {
            OutputFormat::Json => print_json(&serde_json::json!({
                "source": loaded.source.to_string(),
                "path": path,
                "settings": loaded.settings,
            })),
            OutputFormat::Exitcode => {}
            _ => match loaded.settings.to_toml() {
                Ok(text) => {
                    println!("# source: {}", loaded.source);
                    if let Some(p) = &path {
                        println!("# path: {}", p);
                    }
                    print!("{}", text);
                }
                Err(e) => {
                    return output_error(global, &Error::Config(e.to_string()));
                }
            },
        },
        ConfigCommands::Check => match global.format {
            OutputFormat::Json => print_json(&serde_json::json!({
                "status": "ok",
                "source": loaded.source.to_string(),
                "path": path,
            })),
            OutputFormat::Exitcode => {}
            _ => println!(
                "Configuration OK ({}{})",
                loaded.source,
                path.map(|p| format!(": {}", p)).unwrap_or_default()
            ),
        },
    }
    ExitCode::Clean
}

fn print_version(global: &GlobalOpts) {
    let version = env!("CARGO_PKG_VERSION");
    match global.format {
        OutputFormat::Json => print_json(&serde_json::json!({ "name": "rcmd", "version": version })),
        _ => println!("rcmd {}", version),
    }
}
