//! Cycle-accurate model of a microcoded RV32I_Zicsr core.
//!
//! The core implements the RISC-V Machine-Mode privileged architecture as a
//! single-hart, in-order, multicycle machine: every retired RISC-V
//! instruction is a sequence of micro-instructions read from a 256-entry
//! horizontal microcode store, and every micro-instruction consumes exactly
//! one clock tick. The observable boundary is a Wishbone-Classic-style
//! memory bus, a level-sensitive interrupt request line, and an optional
//! per-retirement trace ([`rvfi`]) for conformance checking.

#[macro_use]
extern crate static_assertions;

pub mod board;
pub mod bus;
pub mod core;
pub mod instruction;
pub mod registers;
pub mod resources;
pub mod rvfi;

pub use crate::core::{Config, Core};
