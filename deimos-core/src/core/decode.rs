//! Instruction decoder.
//!
//! The decoder consumes the raw instruction word on the fetch ACK tick and
//! latches everything the micro-routines need: register specifiers, the
//! sign-extended immediate for the instruction's format, the mapping-table
//! result, the compressed CSR index, and the legality verdict. All outputs
//! hold their values until the next fetch.
//!
//! CSR instructions decode in two cycles. The first cycle parks the
//! mapping result on the CSR holding slot and flags the forward; the
//! second resolves the CSR attributes into either the real routine address
//! or an illegal-instruction exception. The dispatch sequence gives that
//! second cycle for free, so the rest of the core never stalls for it.

use crate::instruction::{csr_funct, Insn, Opcode, EBREAK, ECALL, MRET};
use crate::registers::Specifier;

use super::control::{map_csr, map_opcode};
use super::csr::{self, CsrAttr};
use super::exception::Cause;

/// Decoder output latch.
#[derive(Debug, Clone)]
pub struct Decode {
    insn: Insn,
    rs1: Specifier,
    rs2: Specifier,
    rd: Specifier,
    imm: u32,
    csr_index: u8,
    requested_op: u8,
    exception: Option<Cause>,
    forward_csr: bool,
}

impl Default for Decode {
    fn default() -> Self {
        Self::new()
    }
}

impl Decode {
    pub fn new() -> Self {
        Self {
            insn: Insn(0),
            rs1: Specifier::X0,
            rs2: Specifier::X0,
            rd: Specifier::X0,
            imm: 0,
            csr_index: 0,
            requested_op: 0,
            exception: None,
            forward_csr: false,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Latches a freshly fetched instruction word (the fetch ACK tick).
    pub fn decode(&mut self, raw: u32) {
        let insn = Insn(raw);
        self.insn = insn;
        self.rs1 = insn.rs1();
        self.rs2 = insn.rs2();
        self.rd = insn.rd();
        self.imm = immediate(insn);
        self.csr_index = csr::file_index(insn.csr());
        self.requested_op = map_opcode(insn);
        self.exception = legality(insn);
        self.forward_csr = self.exception.is_none() && is_csr_op(insn);
    }

    /// Advances the second CSR decode cycle, if one is pending. Called on
    /// every non-fetch tick; a no-op unless [`decode`](Self::decode)
    /// flagged a forward on the previous tick.
    pub fn step(&mut self) {
        if !self.forward_csr {
            return;
        }
        self.forward_csr = false;
        let insn = self.insn;
        let attr = csr::attributes(insn.csr());
        // CSRRW/CSRRWI always write; the set/clear forms write unless
        // their mask source is x0/zero.
        let writes = matches!(insn.funct3(), csr_funct::RW | csr_funct::RWI)
            || insn.rs1().index() != 0;
        if attr == CsrAttr::Illegal
            || (insn.csr_read_only_space() && writes)
            || insn.csr_quadrant() != 0b11
        {
            self.exception = Some(Cause::IllegalInsn);
        } else {
            self.requested_op = map_csr(attr, insn);
        }
    }

    /// The latched instruction word.
    pub fn insn(&self) -> Insn {
        self.insn
    }

    /// The latched rs1 specifier.
    pub fn rs1(&self) -> Specifier {
        self.rs1
    }

    /// The latched rs2 specifier.
    pub fn rs2(&self) -> Specifier {
        self.rs2
    }

    /// The latched rd specifier.
    pub fn rd(&self) -> Specifier {
        self.rd
    }

    /// The latched immediate, sign-extended per the instruction format.
    pub fn imm(&self) -> u32 {
        self.imm
    }

    /// The latched 5-bit CSR immediate (zero-extended).
    pub fn csr_uimm(&self) -> u32 {
        self.insn.csr_uimm()
    }

    /// The compressed private-file index of the instruction's CSR.
    pub fn csr_index(&self) -> u8 {
        self.csr_index
    }

    /// The mapping-table output for the dispatch word.
    pub fn requested_op(&self) -> u8 {
        self.requested_op
    }

    /// The legality verdict for the dispatched instruction, if an
    /// exception is to be raised.
    pub fn exception(&self) -> Option<Cause> {
        self.exception
    }
}

/// Extracts the immediate for the instruction's format, sign-extended.
fn immediate(insn: Insn) -> u32 {
    match insn.opcode() {
        Some(Opcode::Lui) | Some(Opcode::Auipc) => insn.u_imm() as u32,
        Some(Opcode::Jal) => insn.j_imm() as u32,
        Some(Opcode::Branch) => insn.b_imm() as u32,
        Some(Opcode::Store) => insn.s_imm() as u32,
        _ => insn.i_imm() as u32,
    }
}

fn is_csr_op(insn: Insn) -> bool {
    insn.opcode() == Some(Opcode::System)
        && insn.funct3() != 0
        && insn.funct3() != 0b100
}

/// First-cycle legality verdict for a fetched word.
fn legality(insn: Insn) -> Option<Cause> {
    // Compressed encodings and the all-zero word.
    if insn.0 & 0b11 != 0b11 {
        return Some(Cause::IllegalInsn);
    }
    let funct3 = insn.funct3();
    let funct7 = insn.funct7();
    let illegal = match insn.opcode() {
        None => true,
        Some(Opcode::Lui) | Some(Opcode::Auipc) | Some(Opcode::Jal) => false,
        Some(Opcode::Jalr) => funct3 != 0,
        Some(Opcode::Branch) => funct3 == 0b010 || funct3 == 0b011,
        Some(Opcode::Load) => matches!(funct3, 0b011 | 0b110 | 0b111),
        Some(Opcode::Store) => funct3 >= 0b011,
        Some(Opcode::OpImm) => match funct3 {
            0b001 => funct7 != 0,
            0b101 => funct7 != 0 && funct7 != 0b0100000,
            _ => false,
        },
        Some(Opcode::Op) => match funct3 {
            0b000 | 0b101 => funct7 != 0 && funct7 != 0b0100000,
            _ => funct7 != 0,
        },
        // FENCE only; Zifencei is not implemented.
        Some(Opcode::MiscMem) => funct3 != 0,
        Some(Opcode::System) => match insn.0 {
            ECALL => return Some(Cause::EcallMMode),
            EBREAK => return Some(Cause::Breakpoint),
            MRET => false,
            _ => funct3 == 0 || funct3 == 0b100,
        },
    };
    illegal.then_some(Cause::IllegalInsn)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insn(funct7: u32, rs2: u32, rs1: u32, funct3: u32, rd: u32, opcode: u32) -> u32 {
        funct7 << 25 | rs2 << 20 | rs1 << 15 | funct3 << 12 | rd << 7 | opcode
    }

    #[test]
    fn test_legal_base_ops() {
        assert_eq!(None, legality(Insn(insn(0, 2, 1, 0b000, 3, 0x33)))); // add
        assert_eq!(None, legality(Insn(insn(0b0100000, 2, 1, 0b000, 3, 0x33)))); // sub
        assert_eq!(None, legality(Insn(insn(0, 0, 1, 0b000, 3, 0x13)))); // addi
        assert_eq!(None, legality(Insn(insn(0, 5, 1, 0b001, 3, 0x13)))); // slli
        assert_eq!(None, legality(Insn(insn(0b0100000, 5, 1, 0b101, 3, 0x13)))); // srai
    }

    #[test]
    fn test_illegal_encodings() {
        // The all-zero word and compressed encodings.
        assert_eq!(Some(Cause::IllegalInsn), legality(Insn(0)));
        assert_eq!(Some(Cause::IllegalInsn), legality(Insn(0x0001)));
        // Reserved funct7 on register ops.
        assert_eq!(
            Some(Cause::IllegalInsn),
            legality(Insn(insn(0b0100000, 2, 1, 0b100, 3, 0x33))) // "xor" + bit30
        );
        assert_eq!(
            Some(Cause::IllegalInsn),
            legality(Insn(insn(1, 2, 1, 0b000, 3, 0x33)))
        );
        // slli with nonzero funct7.
        assert_eq!(
            Some(Cause::IllegalInsn),
            legality(Insn(insn(1, 5, 1, 0b001, 3, 0x13)))
        );
        // Reserved branch and load minors.
        assert_eq!(
            Some(Cause::IllegalInsn),
            legality(Insn(insn(0, 2, 1, 0b010, 0, 0x63)))
        );
        assert_eq!(
            Some(Cause::IllegalInsn),
            legality(Insn(insn(0, 0, 1, 0b011, 3, 0x03)))
        );
        // Store funct3 >= 3.
        assert_eq!(
            Some(Cause::IllegalInsn),
            legality(Insn(insn(0, 2, 1, 0b011, 0, 0x23)))
        );
        // JALR with nonzero funct3.
        assert_eq!(
            Some(Cause::IllegalInsn),
            legality(Insn(insn(0, 0, 1, 0b001, 1, 0x67)))
        );
        // FENCE.I (Zifencei) is not implemented.
        assert_eq!(
            Some(Cause::IllegalInsn),
            legality(Insn(insn(0, 0, 0, 0b001, 0, 0x0F)))
        );
        // An unused major opcode (AMO).
        assert_eq!(
            Some(Cause::IllegalInsn),
            legality(Insn(insn(0, 2, 1, 0b010, 3, 0x2F)))
        );
    }

    #[test]
    fn test_system_encodings() {
        assert_eq!(Some(Cause::EcallMMode), legality(Insn(ECALL)));
        assert_eq!(Some(Cause::Breakpoint), legality(Insn(EBREAK)));
        assert_eq!(None, legality(Insn(MRET)));
        // WFI is not among the legal SYSTEM encodings.
        let wfi = 0b0001000_00101_00000_000_00000_1110011;
        assert_eq!(Some(Cause::IllegalInsn), legality(Insn(wfi)));
        // ECALL with a nonzero rd field is not ECALL.
        assert_eq!(
            Some(Cause::IllegalInsn),
            legality(Insn(insn(0, 0, 0, 0, 1, 0x73)))
        );
    }

    #[test]
    fn test_csr_two_cycle_decode() {
        let mut decode = Decode::new();
        // csrrw x1, mscratch, x2
        decode.decode(insn(0, 0, 2, 0b001, 1, 0x73) | (0x340 << 20));
        assert_eq!(None, decode.exception());
        assert_eq!(0x24, decode.requested_op());
        decode.step();
        assert_eq!(None, decode.exception());
        assert_eq!(0x27, decode.requested_op());
        assert_eq!(0x8, decode.csr_index());
        // A second step is a no-op.
        decode.step();
        assert_eq!(0x27, decode.requested_op());
    }

    #[test]
    fn test_csr_illegal_second_cycle() {
        let mut decode = Decode::new();
        // csrrw to an unimplemented machine CSR.
        decode.decode(insn(0, 0, 2, 0b001, 1, 0x73) | (0x306 << 20));
        assert_eq!(None, decode.exception());
        decode.step();
        assert_eq!(Some(Cause::IllegalInsn), decode.exception());
        // Write to the read-only space.
        let mut decode = Decode::new();
        decode.decode(insn(0, 0, 2, 0b001, 1, 0x73) | (0xF11 << 20));
        decode.step();
        assert_eq!(Some(Cause::IllegalInsn), decode.exception());
        // But reading it is fine (csrrs x1, mvendorid, x0).
        let mut decode = Decode::new();
        decode.decode(insn(0, 0, 0, 0b010, 1, 0x73) | (0xF11 << 20));
        decode.step();
        assert_eq!(None, decode.exception());
        assert_eq!(0x25, decode.requested_op());
        // Non-machine quadrant (sscratch).
        let mut decode = Decode::new();
        decode.decode(insn(0, 0, 2, 0b001, 1, 0x73) | (0x140 << 20));
        decode.step();
        assert_eq!(Some(Cause::IllegalInsn), decode.exception());
    }

    #[test]
    fn test_immediates_by_format() {
        let mut decode = Decode::new();
        decode.decode(insn(0, 0, 1, 0b000, 3, 0x13) | (0xFFF << 20)); // addi -1
        assert_eq!(0xFFFF_FFFF, decode.imm());
        decode.decode(0xABCDE << 12 | 0x37); // lui
        assert_eq!(0xABCD_E000, decode.imm());
    }

    #[test]
    fn test_register_latches() {
        let mut decode = Decode::new();
        decode.decode(insn(0, 7, 5, 0b000, 9, 0x33));
        assert_eq!(Specifier::from_bits(5), decode.rs1());
        assert_eq!(Specifier::from_bits(7), decode.rs2());
        assert_eq!(Specifier::from_bits(9), decode.rd());
    }
}
