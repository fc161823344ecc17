//! Horizontal microcode word and the 256-entry microcode store.
//!
//! Every field of [`MicroWord`] is a small fixed-width enumeration or
//! boolean; together they pack into exactly [`WORD_BITS`] bits. Decoding a
//! packed word is a pure function, and the store is immutable after build:
//! [`UCodeRom::new`] checks the image once and rejects any mismatch between
//! the program and this field set.

use thiserror::Error;

/// Width of a packed microcode word, in bits.
pub const WORD_BITS: u32 = 48;

/// Number of entries in the microcode store.
pub const ROM_DEPTH: usize = 256;

/// Type of jump the sequencer performs for this micro-instruction.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub enum JmpType {
    /// Go to the next sequential micro-instruction (upc + 1).
    #[default]
    Cont = 0,
    /// If the condition is met jump to `target`, otherwise jump to the
    /// address supplied by the mapping table. Used on dispatch words.
    Map = 1,
    /// If the condition is met jump to `target`, otherwise continue.
    Direct = 2,
    /// If the condition is met jump to `target`, otherwise go to address
    /// `0` (the fetch word).
    DirectZero = 3,
}

/// Boolean test feeding the sequencer, selected per micro-instruction.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub enum CondTest {
    /// An exception condition holds this tick.
    Exception = 0,
    /// The (registered) ALU output is zero.
    AluZero = 1,
    /// The low 5 bits of the ALU output are zero. Terminates the
    /// one-bit-per-tick shift loops, which shift by `count mod 32`.
    AluLow5Zero = 2,
    /// The bus acknowledged the current request this tick.
    MemValid = 3,
    /// Constant true.
    #[default]
    True = 4,
}

/// Action on the program counter this tick.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub enum PcAction {
    /// Hold the current value.
    #[default]
    Hold = 0,
    /// Increment by 4 bytes.
    Inc = 1,
    /// Load from the ALU output (low two bits discarded).
    LoadAluO = 2,
}

/// Source for the latched ALU A operand.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub enum ASrc {
    /// The register file read port.
    #[default]
    Gp = 0,
    /// The decoded immediate of the current instruction.
    Imm = 1,
    /// The ALU output fed back, for chaining operations.
    AluO = 2,
    /// The constant `0`.
    Zero = 3,
    /// The constant `4`.
    Four = 4,
    /// The constant `31`.
    ThirtyOne = 5,
}

/// Source for the latched ALU B operand.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub enum BSrc {
    /// The register file read port.
    #[default]
    Gp = 0,
    /// The program counter.
    Pc = 1,
    /// The decoded immediate of the current instruction.
    Imm = 2,
    /// The constant `1`.
    One = 3,
    /// The unregistered bus read data, aligned and extended per
    /// [`MemSel`]/[`MemExtend`]. Only valid on an ACK tick.
    DatR = 4,
    /// The 5-bit CSR immediate of the current instruction.
    CsrImm = 5,
    /// The CSR file read port.
    Csr = 6,
    /// The exception router's cause latch.
    McauseLatch = 7,
}

/// ALU operation for this tick. The result is registered and becomes
/// visible on the next tick.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub enum AluOp {
    #[default]
    Add = 0,
    Sub = 1,
    And = 2,
    Or = 3,
    Xor = 4,
    /// Shift left by one.
    Sll = 5,
    /// Logical shift right by one.
    Srl = 6,
    /// Arithmetic shift right by one.
    Sra = 7,
    /// `1` if `A < B` unsigned, else `0`.
    CmpLtu = 8,
}

/// ALU input modifier, applied just before the operation.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub enum AluIMod {
    #[default]
    None = 0,
    /// Invert the most significant bit of both A and B. Turns the unsigned
    /// comparator into a signed one.
    InvMsbAB = 1,
}

/// ALU output modifier, applied just before the result is registered.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub enum AluOMod {
    #[default]
    None = 0,
    /// Invert the least significant bit (synthesizes GE from LT).
    InvLsb = 1,
    /// Clear the least significant bit (JALR targets).
    ClearLsb = 2,
}

/// Register file read address source.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub enum RegRSel {
    /// The rs1 field. On a fetch ACK tick the field is taken directly from
    /// the incoming instruction word (eager read), not the decoder latch.
    #[default]
    InsnRs1 = 0,
    /// The rs2 field from the decoder latch.
    InsnRs2 = 1,
}

/// Register file write address source.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub enum RegWSel {
    /// The rd field from the decoder latch.
    #[default]
    InsnRd = 0,
    /// Address zero, with the x0 write-ignore rule bypassed. Used once by
    /// the reset preamble to force the x0 slot to zero.
    Zero = 1,
}

/// CSR file operation for this tick. A CSR operation and a general
/// register operation never share a tick; the microcode assembler rejects
/// words that request both.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub enum CsrOp {
    #[default]
    None = 0,
    /// Read; the value appears on the CSR read port next tick.
    Read = 1,
    /// Write the ALU output.
    Write = 2,
}

/// CSR file address source.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub enum CsrSel {
    /// The compressed CSR address decoded from the instruction.
    #[default]
    Insn = 0,
    /// The low bits of this word's `target` field. Lets trap microcode
    /// address MTVEC/MEPC/MCAUSE directly; such words must not also use
    /// `target` for a jump.
    Target = 1,
}

/// Memory transfer width.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub enum MemSel {
    /// Instruction fetch or no access; width and byte select are derived
    /// automatically (word at PC).
    #[default]
    Auto = 0,
    Byte = 1,
    HalfWord = 2,
    Word = 3,
}

/// Extension applied to sub-word read data as it flows to the B operand.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub enum MemExtend {
    #[default]
    Zero = 0,
    Sign = 1,
}

/// Exception-handling action for this tick.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub enum ExceptCtl {
    #[default]
    None = 0,
    /// Check the decoder's exception flag and the IRQ lines; latch the
    /// cause. Placed on dispatch words.
    LatchDecoder = 1,
    /// Check the ALU output (a jump target) for instruction misalignment.
    LatchJumpTarget = 2,
    /// Check the ALU output (an effective address) for load misalignment.
    LatchLoadAdr = 3,
    /// Check the ALU output (an effective address) for store misalignment.
    LatchStoreAdr = 4,
    /// Enter the trap: MPIE ← MIE, MIE ← 0.
    EnterTrap = 5,
    /// Leave the trap: MIE ← MPIE, MPIE ← 1. Placed on the MRET word.
    LeaveTrap = 6,
}

/// One horizontal micro-instruction.
///
/// All fields are live every tick; "inactive" concerns are expressed with
/// each enum's zero variant so that a packed word of all zero bits is the
/// canonical no-op (continue to upc + 1, touch nothing).
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct MicroWord {
    /// Micro-PC branch target; doubles as the CSR address when
    /// `csr_sel == CsrSel::Target`.
    pub target: u8,
    pub jmp_type: JmpType,
    pub cond_test: CondTest,
    pub invert_test: bool,
    pub pc_action: PcAction,
    pub latch_a: bool,
    pub latch_b: bool,
    pub a_src: ASrc,
    pub b_src: BSrc,
    pub alu_op: AluOp,
    pub alu_i_mod: AluIMod,
    pub alu_o_mod: AluOMod,
    pub reg_read: bool,
    pub reg_write: bool,
    pub reg_r_sel: RegRSel,
    pub reg_w_sel: RegWSel,
    pub csr_op: CsrOp,
    pub csr_sel: CsrSel,
    pub mem_req: bool,
    pub mem_sel: MemSel,
    pub mem_extend: MemExtend,
    pub write_mem: bool,
    pub insn_fetch: bool,
    pub latch_adr: bool,
    pub latch_data: bool,
    pub except_ctl: ExceptCtl,
}

// Field widths of the packed representation, least significant first.
const TARGET_BITS: u32 = 8;
const JMP_TYPE_BITS: u32 = 2;
const COND_TEST_BITS: u32 = 3;
const INVERT_TEST_BITS: u32 = 1;
const PC_ACTION_BITS: u32 = 2;
const LATCH_A_BITS: u32 = 1;
const LATCH_B_BITS: u32 = 1;
const A_SRC_BITS: u32 = 3;
const B_SRC_BITS: u32 = 3;
const ALU_OP_BITS: u32 = 4;
const ALU_I_MOD_BITS: u32 = 1;
const ALU_O_MOD_BITS: u32 = 2;
const REG_READ_BITS: u32 = 1;
const REG_WRITE_BITS: u32 = 1;
const REG_R_SEL_BITS: u32 = 1;
const REG_W_SEL_BITS: u32 = 1;
const CSR_OP_BITS: u32 = 2;
const CSR_SEL_BITS: u32 = 1;
const MEM_REQ_BITS: u32 = 1;
const MEM_SEL_BITS: u32 = 2;
const MEM_EXTEND_BITS: u32 = 1;
const WRITE_MEM_BITS: u32 = 1;
const INSN_FETCH_BITS: u32 = 1;
const LATCH_ADR_BITS: u32 = 1;
const LATCH_DATA_BITS: u32 = 1;
const EXCEPT_CTL_BITS: u32 = 3;

const_assert_eq!(
    WORD_BITS,
    TARGET_BITS
        + JMP_TYPE_BITS
        + COND_TEST_BITS
        + INVERT_TEST_BITS
        + PC_ACTION_BITS
        + LATCH_A_BITS
        + LATCH_B_BITS
        + A_SRC_BITS
        + B_SRC_BITS
        + ALU_OP_BITS
        + ALU_I_MOD_BITS
        + ALU_O_MOD_BITS
        + REG_READ_BITS
        + REG_WRITE_BITS
        + REG_R_SEL_BITS
        + REG_W_SEL_BITS
        + CSR_OP_BITS
        + CSR_SEL_BITS
        + MEM_REQ_BITS
        + MEM_SEL_BITS
        + MEM_EXTEND_BITS
        + WRITE_MEM_BITS
        + INSN_FETCH_BITS
        + LATCH_ADR_BITS
        + LATCH_DATA_BITS
        + EXCEPT_CTL_BITS
);

impl MicroWord {
    /// Packs this word into its 48-bit representation.
    pub fn pack(&self) -> u64 {
        let mut packed = 0u64;
        let mut shift = 0u32;
        let mut field = |value: u64, bits: u32| {
            debug_assert!(value < 1 << bits);
            packed |= value << shift;
            shift += bits;
        };
        field(self.target as u64, TARGET_BITS);
        field(self.jmp_type as u64, JMP_TYPE_BITS);
        field(self.cond_test as u64, COND_TEST_BITS);
        field(self.invert_test as u64, INVERT_TEST_BITS);
        field(self.pc_action as u64, PC_ACTION_BITS);
        field(self.latch_a as u64, LATCH_A_BITS);
        field(self.latch_b as u64, LATCH_B_BITS);
        field(self.a_src as u64, A_SRC_BITS);
        field(self.b_src as u64, B_SRC_BITS);
        field(self.alu_op as u64, ALU_OP_BITS);
        field(self.alu_i_mod as u64, ALU_I_MOD_BITS);
        field(self.alu_o_mod as u64, ALU_O_MOD_BITS);
        field(self.reg_read as u64, REG_READ_BITS);
        field(self.reg_write as u64, REG_WRITE_BITS);
        field(self.reg_r_sel as u64, REG_R_SEL_BITS);
        field(self.reg_w_sel as u64, REG_W_SEL_BITS);
        field(self.csr_op as u64, CSR_OP_BITS);
        field(self.csr_sel as u64, CSR_SEL_BITS);
        field(self.mem_req as u64, MEM_REQ_BITS);
        field(self.mem_sel as u64, MEM_SEL_BITS);
        field(self.mem_extend as u64, MEM_EXTEND_BITS);
        field(self.write_mem as u64, WRITE_MEM_BITS);
        field(self.insn_fetch as u64, INSN_FETCH_BITS);
        field(self.latch_adr as u64, LATCH_ADR_BITS);
        field(self.latch_data as u64, LATCH_DATA_BITS);
        field(self.except_ctl as u64, EXCEPT_CTL_BITS);
        debug_assert_eq!(WORD_BITS, shift);
        packed
    }

    /// Unpacks a 48-bit representation, rejecting reserved encodings.
    pub fn unpack(packed: u64) -> Result<Self, UCodeError> {
        if packed >> WORD_BITS != 0 {
            return Err(UCodeError::WidthExceeded(packed));
        }
        let mut shift = 0u32;
        let mut field = |bits: u32| {
            let value = (packed >> shift) & ((1 << bits) - 1);
            shift += bits;
            value
        };
        let bad = |name: &'static str| UCodeError::ReservedEncoding(name);
        let word = Self {
            target: field(TARGET_BITS) as u8,
            jmp_type: match field(JMP_TYPE_BITS) {
                0 => JmpType::Cont,
                1 => JmpType::Map,
                2 => JmpType::Direct,
                3 => JmpType::DirectZero,
                _ => unreachable!(),
            },
            cond_test: match field(COND_TEST_BITS) {
                0 => CondTest::Exception,
                1 => CondTest::AluZero,
                2 => CondTest::AluLow5Zero,
                3 => CondTest::MemValid,
                4 => CondTest::True,
                _ => return Err(bad("cond_test")),
            },
            invert_test: field(INVERT_TEST_BITS) != 0,
            pc_action: match field(PC_ACTION_BITS) {
                0 => PcAction::Hold,
                1 => PcAction::Inc,
                2 => PcAction::LoadAluO,
                _ => return Err(bad("pc_action")),
            },
            latch_a: field(LATCH_A_BITS) != 0,
            latch_b: field(LATCH_B_BITS) != 0,
            a_src: match field(A_SRC_BITS) {
                0 => ASrc::Gp,
                1 => ASrc::Imm,
                2 => ASrc::AluO,
                3 => ASrc::Zero,
                4 => ASrc::Four,
                5 => ASrc::ThirtyOne,
                _ => return Err(bad("a_src")),
            },
            b_src: match field(B_SRC_BITS) {
                0 => BSrc::Gp,
                1 => BSrc::Pc,
                2 => BSrc::Imm,
                3 => BSrc::One,
                4 => BSrc::DatR,
                5 => BSrc::CsrImm,
                6 => BSrc::Csr,
                7 => BSrc::McauseLatch,
                _ => unreachable!(),
            },
            alu_op: match field(ALU_OP_BITS) {
                0 => AluOp::Add,
                1 => AluOp::Sub,
                2 => AluOp::And,
                3 => AluOp::Or,
                4 => AluOp::Xor,
                5 => AluOp::Sll,
                6 => AluOp::Srl,
                7 => AluOp::Sra,
                8 => AluOp::CmpLtu,
                _ => return Err(bad("alu_op")),
            },
            alu_i_mod: match field(ALU_I_MOD_BITS) {
                0 => AluIMod::None,
                1 => AluIMod::InvMsbAB,
                _ => unreachable!(),
            },
            alu_o_mod: match field(ALU_O_MOD_BITS) {
                0 => AluOMod::None,
                1 => AluOMod::InvLsb,
                2 => AluOMod::ClearLsb,
                _ => return Err(bad("alu_o_mod")),
            },
            reg_read: field(REG_READ_BITS) != 0,
            reg_write: field(REG_WRITE_BITS) != 0,
            reg_r_sel: match field(REG_R_SEL_BITS) {
                0 => RegRSel::InsnRs1,
                1 => RegRSel::InsnRs2,
                _ => unreachable!(),
            },
            reg_w_sel: match field(REG_W_SEL_BITS) {
                0 => RegWSel::InsnRd,
                1 => RegWSel::Zero,
                _ => unreachable!(),
            },
            csr_op: match field(CSR_OP_BITS) {
                0 => CsrOp::None,
                1 => CsrOp::Read,
                2 => CsrOp::Write,
                _ => return Err(bad("csr_op")),
            },
            csr_sel: match field(CSR_SEL_BITS) {
                0 => CsrSel::Insn,
                1 => CsrSel::Target,
                _ => unreachable!(),
            },
            mem_req: field(MEM_REQ_BITS) != 0,
            mem_sel: match field(MEM_SEL_BITS) {
                0 => MemSel::Auto,
                1 => MemSel::Byte,
                2 => MemSel::HalfWord,
                3 => MemSel::Word,
                _ => unreachable!(),
            },
            mem_extend: match field(MEM_EXTEND_BITS) {
                0 => MemExtend::Zero,
                1 => MemExtend::Sign,
                _ => unreachable!(),
            },
            write_mem: field(WRITE_MEM_BITS) != 0,
            insn_fetch: field(INSN_FETCH_BITS) != 0,
            latch_adr: field(LATCH_ADR_BITS) != 0,
            latch_data: field(LATCH_DATA_BITS) != 0,
            except_ctl: match field(EXCEPT_CTL_BITS) {
                0 => ExceptCtl::None,
                1 => ExceptCtl::LatchDecoder,
                2 => ExceptCtl::LatchJumpTarget,
                3 => ExceptCtl::LatchLoadAdr,
                4 => ExceptCtl::LatchStoreAdr,
                5 => ExceptCtl::EnterTrap,
                6 => ExceptCtl::LeaveTrap,
                _ => return Err(bad("except_ctl")),
            },
        };
        debug_assert_eq!(WORD_BITS, shift);
        Ok(word)
    }

    /// Checks the per-word structural rules the datapath depends on.
    fn check(&self, upc: u8) -> Result<(), UCodeError> {
        // The CSR file and the GP register file share their ports; a CSR
        // operation and a GP register operation cannot share a tick.
        if self.csr_op != CsrOp::None && (self.reg_read || self.reg_write) {
            return Err(UCodeError::CsrRegConflict(upc));
        }
        // A word that addresses the CSR file through `target` cannot also
        // consume `target` as a jump address.
        if self.csr_op != CsrOp::None
            && self.csr_sel == CsrSel::Target
            && self.jmp_type != JmpType::Cont
        {
            return Err(UCodeError::TargetOverload(upc));
        }
        // An instruction fetch is always a full-width read at the PC.
        if self.insn_fetch && (self.write_mem || self.mem_sel != MemSel::Auto) {
            return Err(UCodeError::MalformedFetch(upc));
        }
        Ok(())
    }
}

/// The immutable microcode store.
///
/// The decoded fields used on a tick come from *this tick's* micro-PC: the
/// read is combinationally available.
#[derive(Debug, Clone)]
pub struct UCodeRom {
    words: Box<[MicroWord; ROM_DEPTH]>,
}

impl UCodeRom {
    /// Builds the store from an image, validating every entry.
    ///
    /// Each word must round-trip through its packed representation
    /// unchanged and satisfy the structural rules; a mismatch anywhere
    /// rejects the whole image.
    pub fn new(image: [MicroWord; ROM_DEPTH]) -> Result<Self, UCodeError> {
        for (upc, word) in image.iter().enumerate() {
            word.check(upc as u8)?;
            let reparsed = MicroWord::unpack(word.pack())?;
            if reparsed != *word {
                return Err(UCodeError::PackMismatch(upc as u8));
            }
        }
        Ok(Self {
            words: Box::new(image),
        })
    }

    /// Returns the word addressed by `upc`.
    pub fn word(&self, upc: u8) -> &MicroWord {
        &self.words[upc as usize]
    }
}

/// Rejection reasons for a microcode image.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum UCodeError {
    #[error("packed word {0:#x} exceeds the microcode word width")]
    WidthExceeded(u64),
    #[error("reserved encoding in field {0}")]
    ReservedEncoding(&'static str),
    #[error("word {0:#04x} does not round-trip through packing")]
    PackMismatch(u8),
    #[error("word {0:#04x} requests a CSR and a GP register op on the same tick")]
    CsrRegConflict(u8),
    #[error("word {0:#04x} uses target as both CSR address and jump target")]
    TargetOverload(u8),
    #[error("word {0:#04x} is a malformed instruction fetch")]
    MalformedFetch(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_packs_to_zero() {
        assert_eq!(0, MicroWord::default().pack());
    }

    #[test]
    fn test_pack_roundtrip() {
        let word = MicroWord {
            target: 0xF0,
            jmp_type: JmpType::Map,
            cond_test: CondTest::Exception,
            invert_test: false,
            latch_a: true,
            a_src: ASrc::Gp,
            reg_read: true,
            reg_r_sel: RegRSel::InsnRs2,
            except_ctl: ExceptCtl::LatchDecoder,
            ..MicroWord::default()
        };
        assert_eq!(Ok(word), MicroWord::unpack(word.pack()));
    }

    #[test]
    fn test_pack_width() {
        let word = MicroWord {
            target: 0xFF,
            jmp_type: JmpType::DirectZero,
            cond_test: CondTest::True,
            invert_test: true,
            pc_action: PcAction::LoadAluO,
            latch_a: true,
            latch_b: true,
            a_src: ASrc::ThirtyOne,
            b_src: BSrc::McauseLatch,
            alu_op: AluOp::CmpLtu,
            alu_i_mod: AluIMod::InvMsbAB,
            alu_o_mod: AluOMod::ClearLsb,
            reg_read: true,
            reg_write: true,
            reg_r_sel: RegRSel::InsnRs2,
            reg_w_sel: RegWSel::Zero,
            csr_op: CsrOp::None,
            csr_sel: CsrSel::Target,
            mem_req: true,
            mem_sel: MemSel::Word,
            mem_extend: MemExtend::Sign,
            write_mem: true,
            insn_fetch: false,
            latch_adr: true,
            latch_data: true,
            except_ctl: ExceptCtl::LeaveTrap,
        };
        assert!(word.pack() < 1 << WORD_BITS);
    }

    #[test]
    fn test_rejects_csr_reg_conflict() {
        let mut image = [MicroWord::default(); ROM_DEPTH];
        image[7] = MicroWord {
            csr_op: CsrOp::Read,
            reg_read: true,
            ..MicroWord::default()
        };
        assert_eq!(Err(UCodeError::CsrRegConflict(7)), UCodeRom::new(image).map(|_| ()));
    }

    #[test]
    fn test_rejects_target_overload() {
        let mut image = [MicroWord::default(); ROM_DEPTH];
        image[9] = MicroWord {
            csr_op: CsrOp::Write,
            csr_sel: CsrSel::Target,
            jmp_type: JmpType::Direct,
            ..MicroWord::default()
        };
        assert_eq!(Err(UCodeError::TargetOverload(9)), UCodeRom::new(image).map(|_| ()));
    }
}
