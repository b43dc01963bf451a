use crate::addr::PhyAddr;
use crate::cache::{CacheHierarchy, Replacement};
use crate::cli::{DumpArgs, ImageFormat, PrintArgs, RunArgs, TranslationChoice};
use crate::error::Result;
use crate::mem::Memory;
use crate::program::{Command, DataSize, Order, Program};
use crate::tlb::{AssocTlb, TlbHierarchy};
use crate::walk::page_walk;

/// One simulator session: the memory image, both TLB variants and the
/// cache hierarchy, owned together and driven strictly in program order.
pub struct Simulation {
    mem: Memory,
    assoc_tlb: AssocTlb,
    tlbs: TlbHierarchy,
    caches: CacheHierarchy,
    strategy: TranslationChoice,
}

impl Simulation {
    pub fn new(mem: Memory, strategy: TranslationChoice) -> Self {
        Simulation {
            mem,
            assoc_tlb: AssocTlb::new(),
            tlbs: TlbHierarchy::new(),
            caches: CacheHierarchy::new(),
            strategy,
        }
    }

    pub fn memory(&self) -> &Memory {
        &self.mem
    }

    pub fn tlbs(&self) -> &TlbHierarchy {
        &self.tlbs
    }

    pub fn caches(&self) -> &CacheHierarchy {
        &self.caches
    }

    fn translate(&mut self, command: &Command) -> Result<PhyAddr> {
        match self.strategy {
            TranslationChoice::PageWalk => page_walk(&self.mem, command.vaddr),
            TranslationChoice::FullyAssociative => self
                .assoc_tlb
                .search(&self.mem, command.vaddr)
                .map(|(paddr, _)| paddr),
            TranslationChoice::Hierarchical => self
                .tlbs
                .search(&self.mem, command.vaddr, command.access)
                .map(|(paddr, _)| paddr),
        }
    }

    /// Executes one command, returning the value read if it was a read.
    pub fn execute(&mut self, command: &Command) -> Result<Option<u32>> {
        let paddr = self.translate(command)?;
        debug!("{} -> {}", command.vaddr, paddr);
        match (command.order, command.size) {
            (Order::Read, DataSize::Word) => self
                .caches
                .read(&self.mem, paddr, command.access, Replacement::Lru)
                .map(Some),
            (Order::Read, DataSize::Byte) => self
                .caches
                .read_byte(&self.mem, paddr, Replacement::Lru)
                .map(|byte| Some(u32::from(byte))),
            (Order::Write, DataSize::Word) => {
                self.caches
                    .write(&mut self.mem, paddr, command.write_data, Replacement::Lru)?;
                Ok(None)
            }
            (Order::Write, DataSize::Byte) => {
                self.caches.write_byte(
                    &mut self.mem,
                    paddr,
                    command.write_data as u8,
                    Replacement::Lru,
                )?;
                Ok(None)
            }
        }
    }

    /// Runs a whole program, printing each read result.
    pub fn run(&mut self, program: &Program) -> Result<()> {
        for command in program.commands() {
            if let Some(value) = self.execute(command)? {
                match command.size {
                    DataSize::Word => println!("{command} = 0x{value:08X}"),
                    DataSize::Byte => println!("{command} = 0x{value:02X}"),
                }
            }
        }
        self.report();
        Ok(())
    }

    fn report(&self) {
        match self.strategy {
            TranslationChoice::PageWalk => {}
            TranslationChoice::FullyAssociative => {
                info!("tlb: {:?}", self.assoc_tlb.stats);
            }
            TranslationChoice::Hierarchical => {
                info!("l1 i-tlb: {:?}", self.tlbs.itlb.stats);
                info!("l1 d-tlb: {:?}", self.tlbs.dtlb.stats);
                info!("l2 tlb:   {:?}", self.tlbs.l2.stats);
            }
        }
        info!("l1 i-cache: {:?}", self.caches.l1i.stats);
        info!("l1 d-cache: {:?}", self.caches.l1d.stats);
        info!("l2 cache:   {:?}", self.caches.l2.stats);
    }
}

fn load_memory(path: &str, format: ImageFormat) -> Result<Memory> {
    match format {
        ImageFormat::Dump => Memory::from_dump_file(path),
        ImageFormat::Description => Memory::from_description_file(path),
    }
}

/// Entry point for the `run` subcommand.
pub fn run_program(args: RunArgs) -> Result<()> {
    let mem = load_memory(&args.memory, args.format)?;
    let program = Program::from_file(&args.program)?;
    info!("executing {} commands", program.len());
    let mut sim = Simulation::new(mem, args.tlb);
    sim.run(&program)?;
    if args.dump_caches {
        sim.caches().dump(&mut std::io::stdout().lock())?;
    }
    Ok(())
}

/// Entry point for the `print` subcommand.
pub fn print_program(args: PrintArgs) -> Result<()> {
    let program = Program::from_file(&args.program)?;
    print!("{program}");
    Ok(())
}

/// Entry point for the `dump` subcommand.
pub fn dump_memory(args: DumpArgs) -> Result<()> {
    let mem = load_memory(&args.memory, args.format)?;
    mem.dump_region(
        &mut std::io::stdout().lock(),
        args.from / 4,
        args.to.div_ceil(4),
    )
}
