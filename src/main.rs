use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use rsgrammer::{Reporter, Verbosity};

/// Generates a recursive-descent parser from a grammar description.
#[derive(Parser)]
#[command(name = "rsgrammer", version)]
struct Args {
    /// Grammar description file
    grammar: PathBuf,

    /// Where to write the generated parser source
    #[arg(long, value_name = "PATH")]
    out: PathBuf,

    /// Verbosity: error, warning, success, debug1, info, debug2, debug3, all
    #[arg(long, default_value = "warning", value_parser = parse_verbosity)]
    verbose: Verbosity,
}

fn parse_verbosity(level: &str) -> Result<Verbosity, String> {
    level.parse()
}

fn main() -> ExitCode {
    let args = Args::parse();

    let source = match fs::read_to_string(&args.grammar) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error: cannot read `{}`: {err}", args.grammar.display());
            return ExitCode::FAILURE;
        }
    };

    let filename = args.grammar.display().to_string();
    let mut reporter = Reporter::new(args.verbose, filename);

    match rsgrammer::compile(&source, &mut reporter) {
        Ok(code) => {
            if let Err(err) = fs::write(&args.out, code) {
                eprintln!("error: cannot write `{}`: {err}", args.out.display());
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
