mod cli;
mod coverage;
mod error;
mod manifest;
mod runner;
mod strand;
mod utrs;
mod validate;

use crate::cli::{Cli, Commands};
use clap::{CommandFactory, Parser};
use log::{error, Level};

fn main() {
    simple_logger::init_with_level(Level::Info).unwrap();
    let args = Cli::parse();

    let Some(command) = args.command else {
        // no subcommand is not an error, mirror --help
        Cli::command().print_help().ok();
        return;
    };

    let result = match command {
        Commands::Coverage {
            bam,
            strand,
            cpu,
            temp,
            allow_empty,
        } => crate::coverage::run(&bam, strand, cpu, &temp, allow_empty),
        Commands::Utrs {
            cov,
            stop,
            genes,
            strand,
            out,
            temp,
            allow_empty,
        } => crate::utrs::run(&cov, &stop, &genes, strand, &out, &temp, allow_empty),
    };

    if let Err(err) = result {
        error!("{}", err);
        std::process::exit(1);
    }
}
