mod cli;

use std::process::ExitCode;

use clap::Parser;

fn main() -> ExitCode {
    slabviz::logger::init();
    let args = cli::CliArgs::parse();
    cli::run(args)
}
