//! Per-retirement trace records, after the RISC-V Formal Interface.
//!
//! The core emits one [`Retirement`] per architecturally completed
//! instruction, plus one per trapped instruction (with
//! [`trap`](Retirement::trap) set). An instruction preempted by an external
//! interrupt never ran, so it produces no record; the first instruction of
//! the handler carries [`intr`](Retirement::intr) instead. These records
//! exist so an external checker can verify conformance; nothing in the
//! core consumes them.

/// One entry of the retirement trace.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Retirement {
    /// Monotonically increasing retirement index.
    pub order: u64,
    /// The instruction word.
    pub insn: u32,
    /// The instruction trapped instead of retiring normally; its state
    /// changes are the trap side effects (MEPC/MCAUSE/MSTATUS/PC) only.
    pub trap: bool,
    /// The core halted after this instruction.
    pub halt: bool,
    /// First instruction of a trap handler.
    pub intr: bool,
    /// Privilege mode. Always 3 (machine) on this core.
    pub mode: u8,
    /// Effective XLEN encoding. Always 1 (32-bit) on this core.
    pub ixl: u8,
    /// rs1 field and the value read for it.
    pub rs1_addr: u8,
    pub rs1_rdata: u32,
    /// rs2 field and the value read for it.
    pub rs2_addr: u8,
    pub rs2_rdata: u32,
    /// rd field and the value written; both zero when nothing was written.
    pub rd_addr: u8,
    pub rd_wdata: u32,
    /// PC of this instruction.
    pub pc_rdata: u32,
    /// PC of the next instruction fetched after it.
    pub pc_wdata: u32,
    /// Byte address of the instruction's data access, if any.
    pub mem_addr: u32,
    /// Byte-lane masks of the data access; zero when no access happened.
    pub mem_rmask: u8,
    pub mem_wmask: u8,
    /// Bus data of the access, in bus lane positions.
    pub mem_rdata: u32,
    pub mem_wdata: u32,
    /// Architectural CSR accesses performed by this instruction.
    pub csr: Vec<CsrAccess>,
}

/// One CSR touched by a retired instruction.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct CsrAccess {
    /// The 12-bit CSR specifier.
    pub specifier: u16,
    /// Read mask: all ones if the instruction read the CSR.
    pub rmask: u32,
    /// Write mask: all ones if the instruction wrote the CSR.
    pub wmask: u32,
    /// Value read, when `rmask` is set.
    pub rdata: u32,
    /// Value written, when `wmask` is set.
    pub wdata: u32,
}
