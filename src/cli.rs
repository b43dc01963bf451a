use clap::{Parser, Subcommand, ValueEnum};

/// How virtual addresses are translated before hitting the caches.
#[derive(Clone, Copy, PartialEq, Eq, ValueEnum, Debug)]
#[clap(rename_all = "verbatim")]
pub enum TranslationChoice {
    /// Walk the page tables on every access.
    PageWalk,
    /// Single-level 128-entry fully-associative TLB.
    FullyAssociative,
    /// Split L1 I/D TLBs over a unified L2 TLB.
    Hierarchical,
}

/// On-disk layout of the memory image.
#[derive(Clone, Copy, PartialEq, Eq, ValueEnum, Debug)]
#[clap(rename_all = "verbatim")]
pub enum ImageFormat {
    /// A raw binary dump of the whole memory.
    Dump,
    /// A text file describing page files and their placement.
    Description,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute an access script against a memory image.
    Run(RunArgs),
    /// Parse an access script and print the validated listing.
    Print(PrintArgs),
    /// Load a memory image and hex-dump a range of it.
    Dump(DumpArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Memory image file.
    #[arg(short, long)]
    pub memory: String,

    #[arg(short, long, value_enum, default_value = "Dump")]
    pub format: ImageFormat,

    /// Access script to execute.
    #[arg(short, long)]
    pub program: String,

    #[arg(short, long, value_enum, default_value = "Hierarchical")]
    pub tlb: TranslationChoice,

    /// Dump the cache contents after the run.
    #[arg(long, default_value_t = false)]
    pub dump_caches: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct PrintArgs {
    /// Access script to parse.
    #[arg(short, long)]
    pub program: String,
}

#[derive(Parser, Debug, Clone)]
pub struct DumpArgs {
    /// Memory image file.
    #[arg(short, long)]
    pub memory: String,

    #[arg(short, long, value_enum, default_value = "Dump")]
    pub format: ImageFormat,

    /// First byte address of the range.
    #[arg(long, value_parser = num_parser)]
    pub from: usize,

    /// One past the last byte address of the range.
    #[arg(long, value_parser = num_parser)]
    pub to: usize,
}

static NUM_PARSER_ERR: &str = "Invalid number. Must be base-10, or start with 0x or 0b.";

fn num_parser(s: &str) -> Result<usize, &'static str> {
    match s.get(0..2) {
        Some("0x") => usize::from_str_radix(&s[2..], 16).map_err(|_| NUM_PARSER_ERR),
        Some("0b") => usize::from_str_radix(&s[2..], 2).map_err(|_| NUM_PARSER_ERR),
        _ => s.parse::<usize>().map_err(|_| NUM_PARSER_ERR),
    }
}
