//! Micro-program sequencing: next-address selection, the condition mux,
//! and the opcode mapping table.
//!
//! The mapping table partitions the 8-bit micro-address space into fixed
//! windows, one per macro-group, and appends the minor opcode bits to the
//! window base. It is a pure function; the windows compress into a handful
//! of range tests rather than a stored table.

use crate::instruction::{csr_funct, Insn, Opcode, EBREAK, ECALL, MRET};

use super::csr::CsrAttr;
use super::ucode::{CondTest, JmpType};

/// Fixed micro-routine entry addresses (the §window bases of the mapping
/// table). The microcode image places its routines to match.
pub mod entry {
    /// Instruction fetch; also the implied target of `DirectZero`.
    pub const FETCH: u8 = 0x00;
    /// The dispatch word: exception check plus mapped jump.
    pub const DISPATCH: u8 = 0x01;
    /// Reset vector of the micro-PC; two words re-initialize x0/MCAUSE.
    pub const RESET: u8 = 0x02;
    /// LOAD window base; `funct3` is appended.
    pub const LOAD: u8 = 0x08;
    /// CSR holding slot while the second decode cycle resolves.
    pub const CSR_DECODE: u8 = 0x24;
    /// Read-only-zero CSR access.
    pub const CSR_RO0: u8 = 0x25;
    /// CSRRW with rd = x0 (write only).
    pub const CSR_W: u8 = 0x26;
    /// CSRRW with rd != x0.
    pub const CSR_RW: u8 = 0x27;
    /// Any CSR read without a write (CSRRS/CSRRC/CSRRSI/CSRRCI with a
    /// zero mask source).
    pub const CSR_R: u8 = 0x28;
    /// CSRRS with rs1 != x0.
    pub const CSR_RS: u8 = 0x29;
    /// CSRRC with rs1 != x0.
    pub const CSR_RC: u8 = 0x2A;
    /// CSRRWI with rd = x0 (write only).
    pub const CSR_WI: u8 = 0x2B;
    /// CSRRWI with rd != x0.
    pub const CSR_RWI: u8 = 0x2C;
    /// CSRRSI with uimm != 0.
    pub const CSR_RSI: u8 = 0x2D;
    /// CSRRCI with uimm != 0.
    pub const CSR_RCI: u8 = 0x2E;
    /// MISC-MEM (FENCE) window.
    pub const MISC_MEM: u8 = 0x30;
    /// OP-IMM window base; `funct3` and bit 30 are appended.
    pub const OP_IMM: u8 = 0x40;
    /// AUIPC entry (OP-IMM/OP bodies share the rest of this window).
    pub const AUIPC: u8 = 0x50;
    /// STORE window base; `funct3` is appended.
    pub const STORE: u8 = 0x80;
    /// BRANCH window base; `funct3` is appended.
    pub const BRANCH: u8 = 0x88;
    /// JALR entry.
    pub const JALR: u8 = 0x98;
    /// JAL entry.
    pub const JAL: u8 = 0xB0;
    /// OP window base; `funct3` and bit 30 are appended.
    pub const OP: u8 = 0xC0;
    /// LUI entry.
    pub const LUI: u8 = 0xD0;
    /// Trap entry routine.
    pub const EXCEPTION: u8 = 0xF0;
    /// MRET, inside the exception window.
    pub const MRET: u8 = 0xF8;
    /// Halt slot; the micro-program loops here when halted.
    pub const HALT: u8 = 0xFE;
    /// Panic slot; reached only via a defect in the microcode image.
    pub const PANIC: u8 = 0xFF;
}

/// Computes the next micro-PC.
///
/// Exception routing is not special-cased here: dispatch words encode it
/// by selecting `CondTest::Exception`, so a detected exception wins over
/// the nominal mapped jump.
pub fn next_upc(jmp_type: JmpType, test: bool, upc: u8, target: u8, mapped: u8) -> u8 {
    match jmp_type {
        JmpType::Cont => upc.wrapping_add(1),
        JmpType::Map => {
            if test {
                target
            } else {
                mapped
            }
        }
        JmpType::Direct => {
            if test {
                target
            } else {
                upc.wrapping_add(1)
            }
        }
        JmpType::DirectZero => {
            if test {
                target
            } else {
                entry::FETCH
            }
        }
    }
}

/// The boolean inputs to the condition mux, all valid in the current tick.
#[derive(Debug, Copy, Clone, Default)]
pub struct Conditions {
    pub exception: bool,
    pub alu_zero: bool,
    pub alu_low5_zero: bool,
    pub mem_valid: bool,
}

/// Selects and optionally inverts the test for the sequencer.
pub fn test(cond: CondTest, invert: bool, conditions: &Conditions) -> bool {
    let raw = match cond {
        CondTest::Exception => conditions.exception,
        CondTest::AluZero => conditions.alu_zero,
        CondTest::AluLow5Zero => conditions.alu_low5_zero,
        CondTest::MemValid => conditions.mem_valid,
        CondTest::True => true,
    };
    raw ^ invert
}

/// First-cycle mapping: major opcode (plus the minor bits that
/// discriminate within a window) to a micro-routine entry address.
///
/// Unused slots inside a window map onto encodings the decoder has already
/// flagged illegal, so dispatch diverts to the trap routine before the
/// address is ever used; [`entry::PANIC`] backs the combinations no legal
/// encoding produces.
pub fn map_opcode(insn: Insn) -> u8 {
    let funct3 = insn.funct3();
    let bit30 = insn.bit30() as u8;
    match insn.opcode() {
        Some(Opcode::Load) => entry::LOAD | funct3,
        Some(Opcode::MiscMem) => entry::MISC_MEM,
        Some(Opcode::OpImm) => {
            // Only the shifts discriminate on bit 30.
            if funct3 == 0b001 || funct3 == 0b101 {
                entry::OP_IMM | bit30 << 3 | funct3
            } else {
                entry::OP_IMM | funct3
            }
        }
        Some(Opcode::Auipc) => entry::AUIPC,
        Some(Opcode::Store) => entry::STORE | funct3,
        Some(Opcode::Op) => entry::OP | bit30 << 3 | funct3,
        Some(Opcode::Lui) => entry::LUI,
        Some(Opcode::Branch) => entry::BRANCH | funct3,
        Some(Opcode::Jalr) => entry::JALR,
        Some(Opcode::Jal) => entry::JAL,
        Some(Opcode::System) => match insn.0 {
            MRET => entry::MRET,
            ECALL | EBREAK => entry::PANIC,
            _ if funct3 != 0 && funct3 != 0b100 => entry::CSR_DECODE,
            _ => entry::PANIC,
        },
        None => entry::PANIC,
    }
}

/// Second-cycle mapping for CSR instructions, once the CSR attributes are
/// known. Picks among the per-operation routines; illegal accesses never
/// consume the result because the dispatch word traps first.
pub fn map_csr(attr: CsrAttr, insn: Insn) -> u8 {
    if attr == CsrAttr::ReadOnlyZero {
        return entry::CSR_RO0;
    }
    let rd_zero = insn.rd().index() == 0;
    let mask_zero = insn.rs1().index() == 0;
    match insn.funct3() {
        csr_funct::RW if rd_zero => entry::CSR_W,
        csr_funct::RW => entry::CSR_RW,
        csr_funct::RS if mask_zero => entry::CSR_R,
        csr_funct::RS => entry::CSR_RS,
        csr_funct::RC if mask_zero => entry::CSR_R,
        csr_funct::RC => entry::CSR_RC,
        csr_funct::RWI if rd_zero => entry::CSR_WI,
        csr_funct::RWI => entry::CSR_RWI,
        csr_funct::RSI if mask_zero => entry::CSR_R,
        csr_funct::RSI => entry::CSR_RSI,
        csr_funct::RCI if mask_zero => entry::CSR_R,
        csr_funct::RCI => entry::CSR_RCI,
        _ => entry::PANIC,
    }
}
