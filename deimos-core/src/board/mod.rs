//! Minimal board: the core wired to a flat RAM, with an IRQ line a
//! harness can drive.

use log::info;

use crate::core::ucode::UCodeError;
use crate::core::{Config, Core};
use crate::resources::ram::Ram;
use crate::rvfi::Retirement;

/// Default RAM size of a [`Board`].
pub const DEFAULT_RAM_SIZE: usize = 64 * 1024;

/// A single-core board with all of memory mapped to one RAM.
///
/// The board owns the IRQ line: a harness (or a device model) raises and
/// lowers it with [`set_irq`](Board::set_irq), and the core samples it on
/// every tick. Programs are loaded straight into RAM before releasing the
/// core from reset.
#[derive(Debug)]
pub struct Board {
    core: Core<Ram>,
    irq: bool,
}

impl Board {
    /// Builds a board with `DEFAULT_RAM_SIZE` bytes of zero-wait-state
    /// RAM.
    pub fn new() -> Result<Self, UCodeError> {
        Self::with_ram(Ram::new(DEFAULT_RAM_SIZE))
    }

    /// Builds a board around a caller-provided RAM (different size or
    /// wait-state behavior).
    pub fn with_ram(ram: Ram) -> Result<Self, UCodeError> {
        Ok(Self {
            core: Core::new(ram, Config::default())?,
            irq: false,
        })
    }

    /// Copies `data` into RAM at byte `address`.
    pub fn load(&mut self, address: u32, data: &[u8]) {
        self.core.bus_mut().load(address, data);
    }

    /// Loads a program of little-endian instruction words at `address`.
    pub fn load_words(&mut self, address: u32, words: &[u32]) {
        for (i, word) in words.iter().enumerate() {
            self.load(address + 4 * i as u32, &word.to_le_bytes());
        }
    }

    /// Drives the IRQ input level; it stays until changed.
    pub fn set_irq(&mut self, irq: bool) {
        self.irq = irq;
    }

    /// Advances one clock tick.
    pub fn tick(&mut self) -> Option<Retirement> {
        self.core.tick(self.irq)
    }

    /// Runs until `count` more instructions have retired, or until
    /// `max_ticks` have elapsed. Returns the retirements seen.
    pub fn run_retirements(&mut self, count: usize, max_ticks: usize) -> Vec<Retirement> {
        let mut retired = Vec::new();
        for _ in 0..max_ticks {
            if let Some(retirement) = self.tick() {
                retired.push(retirement);
                if retired.len() == count {
                    break;
                }
            }
            if self.core.halted() {
                info!("core halted at pc {:#010x}", self.core.pc());
                break;
            }
        }
        retired
    }

    pub fn core(&self) -> &Core<Ram> {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut Core<Ram> {
        &mut self.core
    }
}
