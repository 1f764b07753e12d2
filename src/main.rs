//! nestedtx - interactive shell for nested SQL transactions
//!
//! This is the main entry point for the nestedtx command-line interface.

use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use nestedtx::connection::{SqliteConfig, SqliteConnection};
use nestedtx::shell::{Repl, ShellResult};
use nestedtx::transaction::wrap;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    // Parse simple command line args.
    let mut path = String::from(":memory:");
    let mut verbose = false;
    let mut execute: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-d" | "--database" => {
                i += 1;
                if i < args.len() {
                    path = args[i].clone();
                }
            }
            "-v" | "--verbose" => {
                verbose = true;
            }
            "-e" | "--execute" => {
                i += 1;
                if i < args.len() {
                    execute = Some(args[i].clone());
                }
            }
            "-h" | "--help" => {
                print_help();
                return ExitCode::SUCCESS;
            }
            "--version" => {
                println!("nestedtx v{}", env!("CARGO_PKG_VERSION"));
                return ExitCode::SUCCESS;
            }
            arg => {
                // Treat as database path if no flag.
                if !arg.starts_with('-') {
                    path = arg.to_string();
                } else {
                    eprintln!("Unknown option: {}", arg);
                    return ExitCode::FAILURE;
                }
            }
        }
        i += 1;
    }

    init_tracing(verbose);

    let config = SqliteConfig::new(&path).create_if_missing(true);
    let conn = match SqliteConnection::open(&config) {
        Ok(conn) => conn,
        Err(e) => {
            eprintln!("Error opening database: {}", e);
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(path = %conn.path().display(), "database opened");

    let mut repl = Repl::new(wrap(conn));
    let result = match execute {
        Some(sql) => execute_command(&mut repl, &sql).await,
        None => repl.run().await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_help() {
    println!("nestedtx - nested SQL transactions over a single connection");
    println!();
    println!("Usage: nestedtx [OPTIONS] [DATABASE]");
    println!();
    println!("Options:");
    println!("  -d, --database PATH    SQLite database file (default: :memory:)");
    println!("  -e, --execute SQL      Execute SQL and exit");
    println!("  -v, --verbose          Log every transaction statement");
    println!("  -h, --help             Show this help message");
    println!("  --version              Show version");
    println!();
    println!("Examples:");
    println!("  nestedtx                                    Start shell on an in-memory database");
    println!("  nestedtx app.db                             Start shell on 'app.db'");
    println!("  nestedtx -v -e 'BEGIN; BEGIN; ROLLBACK;'    Show the statements issued");
}

async fn execute_command(repl: &mut Repl<SqliteConnection>, sql: &str) -> ShellResult<()> {
    let outputs = repl.execute(sql).await;
    // Anything left open by the script is rolled back.
    let closed = repl.close().await;
    repl.print_outputs(&outputs?);
    closed
}
