use catastro_logging::LogConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

mod cli;

#[derive(Parser, Debug)]
#[command(
    name = "catastro",
    version,
    about = "Convert Spanish cadastral CAT files to Parquet"
)]
struct Cli {
    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Only warnings and errors on stderr
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Append a copy of the log to this file
    #[arg(long, global = true, env = "CATASTRO_LOG_FILE")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert the records of one table into a Parquet file
    Convert(cli::convert::ConvertArgs),

    /// List the supported record types
    Tables {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the field layout of one record type
    Layout {
        /// Record type code (11, 13, 14, 15, 16, 17)
        table: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Commands {
    fn wants_json(&self) -> bool {
        match self {
            Commands::Convert(args) => args.json,
            Commands::Tables { json } | Commands::Layout { json, .. } => *json,
        }
    }
}

fn run_command(command: Commands) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Convert(args) => cli::convert::run(args),
        Commands::Tables { json } => cli::inspect::run_tables(json).map(|()| ExitCode::SUCCESS),
        Commands::Layout { table, json } => {
            cli::inspect::run_layout(&table, json).map(|()| ExitCode::SUCCESS)
        }
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // Help and version go to stdout and are not failures.
            let code = if err.use_stderr() {
                cli::EXIT_FATAL
            } else {
                0
            };
            let _ = err.print();
            return ExitCode::from(code);
        }
    };

    let json_mode = cli.command.wants_json();
    let log_config = LogConfig {
        verbose: cli.verbose,
        quiet: cli.quiet,
        log_file: cli.log_file.clone(),
    };
    if let Err(err) = catastro_logging::init_logging(log_config) {
        eprintln!("Warning: failed to initialize logging: {:#}", err);
    }

    match run_command(cli.command) {
        Ok(code) => code,
        Err(err) => {
            if json_mode {
                cli::error::print_json_error(&err);
            } else {
                eprintln!("{}", cli::error::render(&err));
            }
            ExitCode::from(cli::EXIT_FATAL)
        }
    }
}
