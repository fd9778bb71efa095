use clap::Parser;
use tacalc::cli::{run, Cli};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
