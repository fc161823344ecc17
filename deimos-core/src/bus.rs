//! Defines the core's Wishbone-Classic-style bus master interface.
//!
//! The core is the single *master* on its bus; implementors of [`Bus`] play
//! the *slave* side. Unlike a transaction-level bus model, this interface is
//! expressed at signal level, one exchange per clock tick, because the core
//! is cycle-accurate: microcode loops on a wait micro-instruction until the
//! slave acknowledges, and peripherals may observe (and depend on) the exact
//! tick on which CYC/STB rise and fall.
//!
//! The handshake is the classic single transfer:
//!
//! - The master raises `CYC` and `STB` (plus `WE` for writes) and holds its
//!   address, byte select, and write data stable.
//! - The slave raises `ACK` for one tick to complete the transfer. For
//!   reads, any byte of `DAT_R` whose `SEL` bit is set must be valid on the
//!   ACK tick. Zero-wait-state slaves may acknowledge combinationally on
//!   the same tick the request is presented.
//! - The master deasserts `CYC` and `STB` no later than one tick after
//!   `CYC && STB && ACK`.
//!
//! Addresses are 30-bit *word* addresses; the two byte-offset bits are
//! folded into the 4-bit byte select, so the addressed bytes always appear
//! in their natural lanes of the 32-bit data buses. All data is
//! little-endian.

/// Signals driven by the bus master, sampled by the slave each tick.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct MasterSignals {
    /// Cycle indicator. Asserted for the duration of a bus cycle.
    pub cyc: bool,
    /// Strobe. Qualifies `adr`, `sel`, `we`, and `dat_w`.
    pub stb: bool,
    /// Write enable. Asserted for writes, deasserted for reads.
    pub we: bool,
    /// Word address (30 significant bits).
    pub adr: u32,
    /// Byte select; bit *n* covers `dat` bits `8n..8n+8`.
    pub sel: u8,
    /// Write data, valid when `we` is asserted.
    pub dat_w: u32,
}

impl MasterSignals {
    /// An idle bus: no cycle in progress, all lines deasserted.
    pub const IDLE: Self = Self {
        cyc: false,
        stb: false,
        we: false,
        adr: 0,
        sel: 0,
        dat_w: 0,
    };

    /// Returns `true` if a transfer is being requested this tick.
    pub fn active(&self) -> bool {
        self.cyc && self.stb
    }
}

/// Signals driven by the bus slave, sampled by the master each tick.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct SlaveSignals {
    /// Acknowledge. Asserted for exactly one tick per transfer.
    pub ack: bool,
    /// Read data, valid on the ACK tick of a read.
    pub dat_r: u32,
}

impl SlaveSignals {
    /// No acknowledge this tick; read data lines are undefined-as-zero.
    pub const IDLE: Self = Self {
        ack: false,
        dat_r: 0,
    };
}

/// A Wishbone-Classic-style slave, advanced one tick at a time.
///
/// `cycle` is called exactly once per core tick, whether or not a transfer
/// is being requested, so slaves can model internal state machines (wait
/// states, timers) that advance on every clock edge. A slave must never
/// assert `ack` on a tick where `m.active()` is `false`.
pub trait Bus {
    /// Advance one clock tick, sampling the master lines and driving the
    /// slave lines for this tick.
    fn cycle(&mut self, m: &MasterSignals) -> SlaveSignals;
}
