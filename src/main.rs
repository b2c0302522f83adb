use std::io::Read;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use erdsl::{Diagram, Policy};

#[derive(Parser)]
#[command(name = "erdsl", about = "Translate ER diagram JSON into the diagram editor's DSL")]
struct Cli {
    /// Input file (reads from stdin if not provided)
    file: Option<std::path::PathBuf>,

    /// Serialize despite schema violations (unresolved references still fail)
    #[arg(long)]
    lenient: bool,

    /// Only validate the JSON diagram and report violations
    #[arg(long, conflicts_with = "reverse")]
    check: bool,

    /// Read DSL text and print the diagram as JSON
    #[arg(long)]
    reverse: bool,

    /// Log level used when RUST_LOG is unset
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let input = match &cli.file {
        Some(path) => std::fs::read_to_string(path).unwrap_or_else(|e| {
            eprintln!("ERROR: failed to read {}: {e}", path.display());
            std::process::exit(1);
        }),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).unwrap_or_else(|e| {
                eprintln!("ERROR: failed to read stdin: {e}");
                std::process::exit(1);
            });
            buf
        }
    };

    match run(&cli, &input) {
        Ok(output) => print!("{output}"),
        Err(e) => {
            eprintln!("ERROR: {e}");
            std::process::exit(1);
        }
    }
}

fn run(cli: &Cli, input: &str) -> erdsl::Result<String> {
    if cli.reverse {
        let diagram = erdsl::dsl_parser::parse(input)?;
        return Ok(serde_json::to_string_pretty(&diagram)? + "\n");
    }

    if cli.check {
        let diagram: Diagram = serde_json::from_str(input)?;
        erdsl::validate(&diagram).map_err(erdsl::Error::Invalid)?;
        return Ok("ok\n".to_string());
    }

    let policy = if cli.lenient {
        Policy::Tolerant
    } else {
        Policy::Strict
    };
    erdsl::translate_with_policy(input, policy)
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
