use std::process::ExitCode;

use clap::Parser;
use redactfe::{cli, logger};

fn main() -> ExitCode {
    let args = cli::CliArgs::parse();
    logger::init(if args.verbose { "debug" } else { "info" });
    cli::run(args)
}
