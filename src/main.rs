//! docembed CLI entry point.

use clap::Parser;
use docembed::cli::commands;
use docembed::cli::{Cli, Commands};
use docembed::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    // Resolve effective JSON mode: --json OR non-TTY stdout
    let json = cli.json || !std::io::IsTerminal::is_terminal(&std::io::stdout());

    match run(&cli, json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("docembed=info,warn"),
            2 => EnvFilter::new("debug,rusqlite=info,hyper=info,reqwest=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli, json: bool) -> Result<(), Error> {
    let db = cli.db.as_ref();
    let owner = cli.owner.as_deref();

    match &cli.command {
        Commands::Ingest { command } => commands::ingest::execute(command, db, owner, json),
        Commands::Search(args) => commands::search::execute(args, db, owner, json),

        // Records
        Commands::List { limit } => commands::records::list(*limit, db, owner, json),
        Commands::Show { id } => commands::records::show(id, db, owner, json),
        Commands::Update(args) => commands::records::update(args, db, owner, json),
        Commands::Delete { id } => commands::records::delete(id, db, owner, json),
        Commands::Usage { id, limit } => commands::records::usage(id, *limit, db, owner, json),
        Commands::History { id, limit } => commands::records::history(id, *limit, db, owner, json),

        Commands::AgentSettings { command } => commands::agent::execute(command, db, owner, json),

        Commands::Job { command } => commands::job::execute(command, db, owner, json),
        Commands::Chunk { file, chunking } => commands::chunk::execute(file, *chunking, json),
        Commands::Config { command } => commands::config::execute(command, json),
        Commands::Test { text } => commands::test::execute(text, json),
        Commands::Completions { shell } => commands::completions::execute(shell),
        Commands::Version => commands::version::execute(json),
    }
}
