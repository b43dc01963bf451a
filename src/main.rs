#[macro_use]
extern crate log;

use anyhow::Result;
use clap::Parser;

use mmu_soft::*;

pub fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    debug!("{args:?}");
    match args.command {
        Commands::Run(run) => run_program(run)?,
        Commands::Print(print) => print_program(print)?,
        Commands::Dump(dump) => dump_memory(dump)?,
    }
    Ok(())
}
