use anyhow::{Context, Result as AnyhowResult};
use clap::Parser;
use shmel::config::Config;
use shmel::history::History;
use shmel::services::{log_dirs, tracing_setup};
use shmel::session::Session;
use shmel::shell::Shell;
use shmel::terminal::{
    spawn_key_reader, InputGate, NoSecret, TerminalInput, TerminalModes, TerminalSecretPrompt,
    TerminalSink,
};
use std::path::PathBuf;
use tokio::sync::mpsc;

/// An interactive command shell with job control
#[derive(Parser, Debug)]
#[command(name = "shmel")]
#[command(about = "An interactive command shell with job control", long_about = None)]
#[command(version)]
struct Args {
    /// Path to a JSON config file to use instead of the default one
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Path to log file for tracing output
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// History file to use instead of the configured one
    #[arg(long, value_name = "PATH")]
    history_file: Option<PathBuf>,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    dump_config: bool,

    /// Print the directories and files used by shmel and exit
    #[arg(long)]
    show_paths: bool,

    /// Run one command line without the interactive front end, wait for
    /// every job it started and exit with its status
    #[arg(short = 'c', value_name = "COMMAND")]
    command: Option<String>,
}

fn load_config(args: &Args) -> AnyhowResult<Config> {
    let config = Config::load(args.config.as_deref()).context("Failed to load config")?;
    config.validate().context("Invalid config")?;
    Ok(config)
}

fn load_history(args: &Args, config: &Config) -> History {
    let path = args
        .history_file
        .clone()
        .or_else(|| config.history.resolved_path());

    let Some(path) = path else {
        tracing::warn!("No home directory, history will not be saved");
        return History::new(config.history.max_size);
    };

    let mut history = History::with_file(path, config.history.max_size);
    match history.load() {
        Ok(count) => tracing::debug!("Loaded {} history entries", count),
        Err(e) => tracing::warn!("Failed to load history: {}", e),
    }
    history
}

/// Interactive session: raw terminal, key reader thread and the control loop
async fn run_interactive(args: &Args, config: &Config) -> AnyhowResult<i32> {
    let session = Session::from_current_dir(config.prompt.suffix.clone())
        .context("Failed to read current directory")?;
    let history = load_history(args, config);

    let (job_tx, mut job_rx) = mpsc::unbounded_channel();
    let (key_tx, mut key_rx) = mpsc::unbounded_channel();
    let gate = InputGate::new();

    let mut terminal_modes = TerminalModes::enable().context("Failed to set up terminal")?;
    let _reader = spawn_key_reader(key_tx, gate.clone());

    let mut shell = Shell::new(
        config,
        session,
        history,
        job_tx,
        TerminalSink::interactive(),
        TerminalSecretPrompt::new(gate),
    );

    while !shell.should_exit() {
        tokio::select! {
            input = key_rx.recv() => match input {
                Some(TerminalInput::Key(key)) => shell.handle_key(&key),
                Some(TerminalInput::Paste(text)) => shell.handle_paste(&text),
                None => {
                    tracing::warn!("Keyboard reader stopped");
                    break;
                }
            },
            Some(event) = job_rx.recv() => shell.handle_job_event(event),
        }
    }

    tracing::info!("Shell exiting");
    shell.shutdown().await;
    drop(key_rx);
    terminal_modes.undo();
    println!();

    Ok(0)
}

/// Non-interactive run of a single line
async fn run_command(config: &Config, line: &str) -> AnyhowResult<i32> {
    let session = Session::from_current_dir(config.prompt.suffix.clone())
        .context("Failed to read current directory")?;
    let (job_tx, mut job_rx) = mpsc::unbounded_channel();

    let mut shell = Shell::new(
        config,
        session,
        History::new(config.history.max_size),
        job_tx,
        TerminalSink::plain(),
        NoSecret,
    );

    shell.execute(line);
    while !shell.jobs().is_idle() {
        match job_rx.recv().await {
            Some(event) => shell.handle_job_event(event),
            None => break,
        }
    }

    Ok(shell.last_status().unwrap_or(0))
}

fn main() -> AnyhowResult<()> {
    let args = Args::parse();

    if args.show_paths {
        log_dirs::print_all_paths();
        return Ok(());
    }

    if args.dump_config {
        let config = load_config(&args)?;
        let json =
            serde_json::to_string_pretty(&config).context("Failed to serialize config")?;
        println!("{}", json);
        return Ok(());
    }

    let log_file = args
        .log_file
        .clone()
        .unwrap_or_else(log_dirs::main_log_path);
    if !tracing_setup::init_global(&log_file) {
        eprintln!("Warning: could not write log file {}", log_file.display());
    }
    log_dirs::cleanup_stale_logs();
    tracing::info!("Shell starting");

    let config = load_config(&args)?;

    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        TerminalModes::emergency_cleanup();
        original_hook(panic);
    }));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let status = runtime.block_on(async {
        match args.command.as_deref() {
            Some(line) => run_command(&config, line).await,
            None => run_interactive(&args, &config).await,
        }
    })?;

    // Stray supervisor tasks are dropped here, which kills their children
    drop(runtime);

    if status != 0 {
        std::process::exit(status);
    }
    Ok(())
}
