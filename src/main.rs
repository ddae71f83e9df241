use clap::Parser;
use ghostcleaner::cli::{self, Args};
use ghostcleaner::output::OutputFormatter;
use std::process;

fn main() {
    let args = Args::parse();

    // GHOSTCLEANER_LOG takes precedence over -v.
    env_logger::Builder::new()
        .filter_level(args.log_level())
        .parse_env("GHOSTCLEANER_LOG")
        .format_timestamp(None)
        .init();

    let code = match cli::run(&args) {
        Ok(code) => code,
        Err(e) => {
            OutputFormatter::error(&format!("Error: {:#}", e));
            cli::exit_code_for(&e)
        }
    };

    process::exit(code);
}
