#[macro_use]
extern crate log;

pub mod addr;
pub mod cache;
pub mod cli;
pub mod error;
pub mod list;
pub mod mem;
pub mod program;
pub mod sim;
pub mod tlb;
mod util;
pub mod walk;

pub use crate::addr::{PhyAddr, VirtAddr};
pub use crate::cache::{CacheHierarchy, Replacement, SetAssocCache};
pub use crate::cli::*;
pub use crate::error::{Error, Result};
pub use crate::list::IndexList;
pub use crate::mem::Memory;
pub use crate::program::{AccessType, Command, DataSize, Order, Program};
pub use crate::sim::{dump_memory, print_program, run_program, Simulation};
pub use crate::tlb::{AssocTlb, TlbHierarchy};
pub use crate::walk::page_walk;
