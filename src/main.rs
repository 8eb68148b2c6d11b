use clap::{Parser as ClapParser, Subcommand};
use std::io::{self, Read};
use std::path::PathBuf;
use termql::cli::{self, CliError, ParseOptions, RunOptions, RunResult};
use tracing_subscriber::EnvFilter;

#[derive(ClapParser)]
#[command(name = "termql")]
#[command(about = "termql - compose SQL queries with a compact term language")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a term and print its canonical form
    Parse {
        /// The term to parse
        term: String,

        /// Print the parsed structure
        #[arg(long)]
        tree: bool,
    },

    /// Resolve and execute a term
    Run {
        /// The term to execute
        term: String,

        /// Directory holding leaf artifacts
        #[arg(short, long)]
        store: PathBuf,

        /// SQLite database file
        #[arg(short, long)]
        db: PathBuf,

        /// JSON object of parameter values (reads from stdin if not provided)
        #[arg(short, long)]
        params: Option<String>,

        /// JSON config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Only return the first row
        #[arg(long)]
        first: bool,

        /// Pretty-print the output
        #[arg(long)]
        pretty: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Parse { term, tree } => cli::execute_parse(&ParseOptions { term, tree }).map(|text| {
            println!("{}", text);
        }),
        Commands::Run {
            term,
            store,
            db,
            params,
            config,
            first,
            pretty,
        } => run(
            RunOptions {
                term,
                store,
                db,
                params,
                config,
                first,
            },
            pretty,
        ),
    };

    if let Err(e) = result {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn run(mut options: RunOptions, pretty: bool) -> Result<(), CliError> {
    if options.params.is_none() && !atty::is(atty::Stream::Stdin) {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer).map_err(CliError::Io)?;
        options.params = Some(buffer);
    }

    match cli::execute_run(&options)? {
        RunResult::Selected(output) => {
            let json = if pretty {
                serde_json::to_string_pretty(&output)
            } else {
                serde_json::to_string(&output)
            }?;
            println!("{}", json);
        }
        RunResult::Affected(count) => println!("{} row(s) affected", count),
    }
    Ok(())
}
