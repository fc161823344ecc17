//! Exception detection and cause latching.
//!
//! RISC-V defines a priority order for simultaneous exceptions. Because the
//! core is microcoded and an instruction spends several ticks in flight,
//! most of that ordering falls out of *when* the microcode asks: each
//! micro-instruction names at most one check through
//! [`ExceptCtl`](super::ucode::ExceptCtl), and the router answers for that
//! tick only. The answer feeds the sequencer's `exception` condition
//! immediately; the specific cause is latched for the trap-entry routine to
//! copy into MCAUSE.

use super::ucode::{ExceptCtl, MemSel};
use super::align;

/// Trap cause, as encoded into the MCAUSE register.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Cause {
    /// Instruction address misaligned (code 0).
    InsnMisaligned,
    /// Illegal instruction, including illegal CSR access (code 2).
    IllegalInsn,
    /// Breakpoint (code 3).
    Breakpoint,
    /// Load address misaligned (code 4).
    LoadMisaligned,
    /// Store address misaligned (code 6).
    StoreMisaligned,
    /// Environment call from M-mode (code 11).
    EcallMMode,
    /// Machine external interrupt (asynchronous, code 11 with the
    /// interrupt bit set).
    MachineExternal,
}

impl Cause {
    /// Returns the 32-bit MCAUSE encoding of this cause.
    pub fn mcause(self) -> u32 {
        match self {
            Cause::InsnMisaligned => 0,
            Cause::IllegalInsn => 2,
            Cause::Breakpoint => 3,
            Cause::LoadMisaligned => 4,
            Cause::StoreMisaligned => 6,
            Cause::EcallMMode => 11,
            Cause::MachineExternal => 0x8000_000B,
        }
    }
}

/// Exception-relevant state the router snoops on a check tick.
#[derive(Debug, Copy, Clone)]
pub struct Sources {
    /// The decoder's exception flag and cause for the dispatched
    /// instruction, if any.
    pub decode: Option<Cause>,
    /// `MSTATUS.MIE && MIP.MEIP && MIE.MEIE` this tick.
    pub irq_pending: bool,
    /// The registered ALU output: a jump target or effective address on
    /// the ticks that check it.
    pub alu_out: u32,
    /// The access width named by the current micro-instruction.
    pub mem_sel: MemSel,
}

/// Detects exceptions and holds the pending cause latch.
#[derive(Debug, Clone, Default)]
pub struct ExceptionRouter {
    mcause: u32,
}

impl ExceptionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cause latched by the most recent firing check, in MCAUSE
    /// encoding. Feeds the `mcause_latch` B-operand source; the trap-entry
    /// microcode copies it into the MCAUSE register.
    pub fn mcause(&self) -> u32 {
        self.mcause
    }

    /// Clears the latch to its reset value.
    pub fn reset(&mut self) {
        self.mcause = 0;
    }

    /// Performs the check named by `ctl` against `src`.
    ///
    /// Returns the detected cause, if any; the caller treats `Some` as the
    /// `exception` condition for this tick and must call
    /// [`commit`](Self::commit) with the result at the end of the tick.
    pub fn check(&self, ctl: ExceptCtl, src: &Sources) -> Option<Cause> {
        match ctl {
            ExceptCtl::LatchDecoder => {
                // A synchronous exception on the dispatched instruction
                // takes priority over a pending external interrupt.
                if let Some(cause) = src.decode {
                    Some(cause)
                } else if src.irq_pending {
                    Some(Cause::MachineExternal)
                } else {
                    None
                }
            }
            // Jump targets have bit 0 already zero (B/J immediates and
            // JALR's cleared LSB), so only bit 1 can misalign them.
            ExceptCtl::LatchJumpTarget => {
                (src.alu_out & 0b10 != 0).then_some(Cause::InsnMisaligned)
            }
            ExceptCtl::LatchLoadAdr => align::misaligned(src.mem_sel, src.alu_out)
                .then_some(Cause::LoadMisaligned),
            ExceptCtl::LatchStoreAdr => align::misaligned(src.mem_sel, src.alu_out)
                .then_some(Cause::StoreMisaligned),
            ExceptCtl::None | ExceptCtl::EnterTrap | ExceptCtl::LeaveTrap => None,
        }
    }

    /// Latches the outcome of this tick's [`check`](Self::check).
    pub fn commit(&mut self, detected: Option<Cause>) {
        if let Some(cause) = detected {
            self.mcause = cause.mcause();
        }
    }
}
