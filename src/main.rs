use std::process::ExitCode;

use clap::Parser;

use lumafe::cli::{self, CliArgs};
use lumafe::logger;

fn main() -> ExitCode {
    let args = CliArgs::parse();
    // Initialize session log (overwrites previous session log)
    logger::init(args.verbose);
    cli::run(args)
}
