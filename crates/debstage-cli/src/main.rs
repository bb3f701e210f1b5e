mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{StagingArgs, EXIT_FAILURE, EXIT_LOCK_ERROR, EXIT_MANIFEST_ERROR};
use debstage_core::{install_signal_handler, StagingConfig};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "debstage",
    version,
    about = "Stage apt packages into a private install root without touching the host"
)]
struct Cli {
    /// Config file with staging defaults (default: ~/.config/debstage/config.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Trust keys, add repositories, download and extract the requested packages.
    Install {
        #[command(flatten)]
        staging: StagingArgs,
    },
    /// Show every tool invocation an install would run, without running any.
    Plan {
        #[command(flatten)]
        staging: StagingArgs,
    },
    /// Run diagnostic checks on host tools, baseline files and the cache root.
    Doctor {
        #[command(flatten)]
        staging: StagingArgs,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("DEBSTAGE_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    install_signal_handler();

    if matches!(cli.command, Commands::Install { .. })
        && std::env::var("DEBSTAGE_SKIP_PREREQS").as_deref() != Ok("1")
    {
        let missing = debstage_runtime::check_host_prereqs();
        if !missing.is_empty() {
            eprintln!("error: {}", debstage_runtime::format_missing(&missing));
            return ExitCode::from(EXIT_FAILURE);
        }
    }

    let json_output = cli.json;
    let result = load_config(cli.config.as_ref()).and_then(|config| match cli.command {
        Commands::Install { staging } => {
            commands::install::run(staging.resolve(&config), json_output)
        }
        Commands::Plan { staging } => commands::plan::run(staging.resolve(&config), json_output),
        Commands::Doctor { staging } => {
            commands::doctor::run(&staging.resolve(&config), json_output)
        }
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(&dir),
    });

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("manifest error:")
                || msg.starts_with("failed to parse manifest")
                || msg.starts_with("failed to read manifest")
            {
                EXIT_MANIFEST_ERROR
            } else if msg.starts_with("root lock:") {
                EXIT_LOCK_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<StagingConfig, String> {
    match path {
        Some(p) => StagingConfig::load(p),
        None => StagingConfig::load_default(),
    }
    .map_err(|e| e.to_string())
}
