//! spawnctl - run a command with captured output, timeouts and exit code policy.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use spawnctl::config::ConfigLoader;
use spawnctl::display;
use spawnctl::spawn::{display_command, parse_exit_code, Spawn};

#[derive(Parser)]
#[command(
    name = "spawnctl",
    about = "Run a command with captured output, timeouts and exit code policy",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command once and exit with its exit code.
    Run {
        /// Kill the command with SIGTERM after this many milliseconds.
        #[arg(short, long)]
        timeout: Option<u64>,
        /// Exit code treated as success.
        #[arg(short, long, value_parser = parse_code)]
        expect: Option<i32>,
        /// Treat every exit code as success.
        #[arg(long)]
        ignore_exit_code: bool,
        /// Print the run snapshot as JSON instead of streaming output.
        #[arg(long)]
        json: bool,
        /// Config file to load instead of the default search paths.
        #[arg(long)]
        config: Option<PathBuf>,
        /// The command and its arguments.
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}

fn parse_code(value: &str) -> Result<i32, String> {
    parse_exit_code(value).map_err(|e| e.to_string())
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            timeout,
            expect,
            ignore_exit_code,
            json,
            config,
            command,
        } => {
            let loader = config.map_or_else(ConfigLoader::new, ConfigLoader::with_path);
            let file_config = match loader.load() {
                Ok(c) => c,
                Err(e) => {
                    display::print_error(&e.to_string());
                    std::process::exit(2);
                }
            };

            let mut options = file_config.to_options(command);
            if let Some(ms) = timeout {
                options.timeout_in = Some(ms);
            }
            if let Some(code) = expect {
                options.expected_exit_code = code;
            }
            options.ignore_exit_code |= ignore_exit_code;
            if !json {
                options = options
                    .on_stdout(display::forwarder("stdout", display::print_stdout))
                    .on_stderr(display::forwarder("stderr", display::print_stderr));
            }

            tracing::info!(
                command = %display_command(&options.command),
                timeout_ms = ?options.timeout_in,
                expected_exit_code = options.expected_exit_code,
                "Starting spawn"
            );
            if !json {
                display::print_run_start(&display_command(&options.command), options.timeout_in);
            }

            std::process::exit(run(options, json).await);
        }
    }
}

async fn run(options: spawnctl::config::SpawnOptions, json: bool) -> i32 {
    let spawn = match Spawn::with_options(options) {
        Ok(s) => s,
        Err(e) => {
            display::print_error(&e.to_string());
            return 2;
        }
    };

    let completion = match spawn.run() {
        Ok(c) => c,
        Err(e) => {
            display::print_error(&e.to_string());
            return 2;
        }
    };
    let result = completion.await;

    if json {
        match serde_json::to_string_pretty(&spawn) {
            Ok(out) => println!("{out}"),
            Err(e) => display::print_error(&e.to_string()),
        }
    } else {
        display::print_exit(spawn.exit_code(), result.is_ok());
    }

    match result {
        Ok(_) => 0,
        Err(e) => {
            if !json {
                display::print_error(&e.to_string());
            }
            spawn.exit_code().filter(|c| *c != 0).unwrap_or(1)
        }
    }
}
