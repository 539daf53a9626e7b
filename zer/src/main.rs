mod cli;
mod repl;

use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use zer_core::{eval::prelude::EXTENSION, utils::prelude::Error, Config, Runtime, VERSION};

use cli::{print_error, print_error_message, print_interrupted};

/// Filter directives for the log written to stderr.
const LOG_VAR: &str = "ZER_LOG";

#[derive(Parser)]
#[command(name = "zer", about = "Runs Zerionyx programs")]
struct Args {
    /// Path of source file; opens the interactive loop when omitted
    path: Option<PathBuf>,
    /// Handed to the program as `argv`, after the path
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
    /// Print the version and exit
    #[arg(long, default_value_t = false)]
    version: bool,
    /// Directory holding `libs/` [default: beside the executable]
    #[arg(long, value_name = "DIR")]
    lib_root: Option<PathBuf>,
    /// Print the tokens of every line instead of running it
    #[arg(long, default_value_t = false)]
    tokens: bool,
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_VAR).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();

    if args.version {
        println!("{VERSION}");
        return ExitCode::SUCCESS;
    }

    init_logging();

    if let Err(err) = ctrlc::set_handler(|| {
        print_interrupted();
        std::process::exit(2);
    }) {
        debug!("could not install the interrupt handler: {err}");
    }

    let mut config = Config::default();
    if let Some(lib_root) = args.lib_root {
        config.lib_root = lib_root;
    }

    if args.tokens {
        return exit_code(repl::start_tokens());
    }

    let Some(path) = args.path else {
        return exit_code(repl::start(&Runtime::new(config)));
    };

    if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
        print_error_message(&format!("The file must have a '.{EXTENSION}' extension"));
        return ExitCode::FAILURE;
    }
    let path = std::path::absolute(&path).unwrap_or(path);
    if !path.is_file() {
        print_error_message(&format!("File '{}' does not exist", path.display()));
        return ExitCode::FAILURE;
    }

    config.argv = std::iter::once(path.display().to_string())
        .chain(args.args)
        .collect();

    debug!(path = %path.display(), "running file");
    match Runtime::new(config).run_file(&path) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err @ Error::Empty { .. }) => {
            print_error_message(&err.to_string());
            ExitCode::SUCCESS
        },
        Err(err) => {
            print_error(&err);
            ExitCode::FAILURE
        }
    }
}

fn exit_code(result: std::io::Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            print_error_message(&format!("Failed to read input: {err}"));
            ExitCode::FAILURE
        }
    }
}
