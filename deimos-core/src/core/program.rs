//! The microcode image.
//!
//! This module is the microcode *source*: a deterministic population of all
//! 256 store entries. Routine entry addresses are fixed by the mapping
//! table windows ([`entry`]); body words live in the gaps between windows.
//! Every unassigned slot, and every window slot only an illegal encoding
//! could map to, jumps to the panic slot.
//!
//! A note on timing, which every routine below leans on: the ALU output is
//! a register, so an operation named on one word is visible to the *next*
//! word; operand latches capture their sources as they stood at the start
//! of the tick; and the register-file read port holds the value of the read
//! issued on an earlier tick. Comments on the right of each word give the
//! state as seen *by* that word.

use super::control::entry;
use super::csr;
use super::ucode::{
    ASrc, AluIMod, AluOMod, AluOp, BSrc, CondTest, CsrOp, CsrSel, ExceptCtl, JmpType, MemExtend,
    MemSel, MicroWord, PcAction, RegRSel, RegWSel, UCodeError, UCodeRom, ROM_DEPTH,
};

// Body block addresses. Entries inside mapping windows jump here; these
// addresses are unreachable from the mapping table itself.
const RESET_TAIL: u8 = 0x04;
const CSR_RO0_BODY: u8 = 0x05;
const LB_BODY: u8 = 0x10;
const LH_BODY: u8 = 0x15;
const LW_BODY: u8 = 0x1A;
const LBU_BODY: u8 = 0x1F;
const LHU_BODY: u8 = 0x31;
const SB_BODY: u8 = 0x36;
const SH_BODY: u8 = 0x3B;
const CSR_W_BODY: u8 = 0x4A;
const CSR_WI_BODY: u8 = 0x4E;
const ADD_BODY: u8 = 0x53;
const SLT_BODY: u8 = 0x55;
const SLTU_BODY: u8 = 0x57;
const XOR_BODY: u8 = 0x59;
const OR_BODY: u8 = 0x5B;
const AND_BODY: u8 = 0x5D;
const SUB_BODY: u8 = 0x5F;
const SLL_BODY: u8 = 0x61;
const SRL_BODY: u8 = 0x67;
const SRA_BODY: u8 = 0x6D;
const SHIFT_WB: u8 = 0x73;
const CSR_R_BODY: u8 = 0x74;
const CSR_RW_BODY: u8 = 0x77;
const CSR_RS_BODY: u8 = 0x7B;
const SW_BODY: u8 = 0x90;
const BEQ_BODY: u8 = 0x9E;
const BNE_BODY: u8 = 0xA1;
const BLT_BODY: u8 = 0xA4;
const BGE_BODY: u8 = 0xA7;
const BLTU_BODY: u8 = 0xAA;
const BGEU_BODY: u8 = 0xAD;
const BR_TAKEN: u8 = 0xB6;
const BR_NOT_TAKEN: u8 = 0xB9;
const CSR_RC_BODY: u8 = 0xD3;
const CSR_RWI_BODY: u8 = 0xD9;
const CSR_RSI_BODY: u8 = 0xDD;
const CSR_RCI_BODY: u8 = 0xE2;

/// Builds the validated microcode store.
pub fn rom() -> Result<UCodeRom, UCodeError> {
    UCodeRom::new(image())
}

/// Emits the full 256-entry image.
pub fn image() -> [MicroWord; ROM_DEPTH] {
    let mut asm = Asm::new();
    common(&mut asm);
    loads(&mut asm);
    stores(&mut asm);
    alu_ops(&mut asm);
    shifts(&mut asm);
    branches(&mut asm);
    jumps(&mut asm);
    upper_immediates(&mut asm);
    csr_ops(&mut asm);
    traps(&mut asm);
    asm.finish()
}

fn nop() -> MicroWord {
    MicroWord::default()
}

/// Unconditional jump to `target`.
fn goto(target: u8) -> MicroWord {
    MicroWord {
        jmp_type: JmpType::Direct,
        cond_test: CondTest::True,
        target,
        ..nop()
    }
}

/// Write the ALU output to rd, then return to fetch.
fn writeback_and_fetch() -> MicroWord {
    MicroWord {
        reg_write: true,
        ..goto(entry::FETCH)
    }
}

fn common(asm: &mut Asm) {
    // Fetch: request the word at PC and spin here until the bus answers.
    // On the ACK tick, decode begins and the register file is read eagerly
    // at the rs1 field of the incoming word, so the dispatch word already
    // has x[rs1] on the read port.
    asm.at(
        entry::FETCH,
        MicroWord {
            mem_req: true,
            insn_fetch: true,
            reg_read: true,
            reg_r_sel: RegRSel::InsnRs1,
            cond_test: CondTest::MemValid,
            invert_test: true,
            jmp_type: JmpType::Direct,
            target: entry::FETCH,
            ..nop()
        },
    );
    // Dispatch: check for exceptions (including a pending enabled IRQ) and
    // jump into the mapped routine, or into trap entry. Latch A <- x[rs1]
    // and start the rs2 read that most routines consume.
    asm.at(
        entry::DISPATCH,
        MicroWord {
            except_ctl: ExceptCtl::LatchDecoder,
            cond_test: CondTest::Exception,
            jmp_type: JmpType::Map,
            target: entry::EXCEPTION,
            latch_a: true,
            a_src: ASrc::Gp,
            reg_read: true,
            reg_r_sel: RegRSel::InsnRs2,
            ..nop()
        },
    );
    // Reset preamble. The micro-PC resets to this address; the ALU output
    // register resets to zero, so these two words force x0 and MCAUSE to
    // known-zero before anything is fetched.
    asm.at(
        entry::RESET,
        MicroWord {
            reg_write: true,
            reg_w_sel: RegWSel::Zero,
            ..nop()
        },
    );
    asm.at(
        entry::RESET + 1,
        MicroWord {
            csr_op: CsrOp::Write,
            csr_sel: CsrSel::Target,
            target: csr::index::MCAUSE,
            ..nop()
        },
    );
    asm.at(RESET_TAIL, goto(entry::FETCH));
    // FENCE (and the rest of MISC-MEM) is a no-op on a core with no
    // caches and a single hart.
    asm.at(
        entry::MISC_MEM,
        MicroWord {
            pc_action: PcAction::Inc,
            ..goto(entry::FETCH)
        },
    );
    // Halt and panic slots pin the micro-PC in place.
    asm.at(entry::HALT, goto(entry::HALT));
    asm.at(entry::PANIC, goto(entry::PANIC));
}

/// Latch B <- the decoded immediate and tail into `body`. Entry word of
/// the loads, stores, and OP-IMM group.
fn imm_entry(body: u8) -> MicroWord {
    MicroWord {
        latch_b: true,
        b_src: BSrc::Imm,
        ..goto(body)
    }
}

/// Load body: compute the effective address, check alignment before any
/// bus activity, wait for the data, extend it, and write rd.
fn load_body(asm: &mut Asm, base: u8, sel: MemSel, extend: MemExtend) {
    // rs1 + offset -> EA; stage A <- 0 for the extension pass-through.
    asm.at(
        base,
        MicroWord {
            alu_op: AluOp::Add,
            latch_a: true,
            a_src: ASrc::Zero,
            ..nop()
        },
    );
    // Latch the EA; a misaligned address traps here, before STB.
    asm.at(
        base + 1,
        MicroWord {
            latch_adr: true,
            except_ctl: ExceptCtl::LatchLoadAdr,
            mem_sel: sel,
            cond_test: CondTest::Exception,
            jmp_type: JmpType::Direct,
            target: entry::EXCEPTION,
            ..nop()
        },
    );
    // Request and wait; the ACK tick latches the aligned, extended datum.
    asm.at(
        base + 2,
        MicroWord {
            mem_req: true,
            mem_sel: sel,
            mem_extend: extend,
            latch_b: true,
            b_src: BSrc::DatR,
            cond_test: CondTest::MemValid,
            invert_test: true,
            jmp_type: JmpType::Direct,
            target: base + 2,
            ..nop()
        },
    );
    asm.at(
        base + 3,
        MicroWord {
            alu_op: AluOp::Add,
            pc_action: PcAction::Inc,
            ..nop()
        },
    );
    asm.at(base + 4, writeback_and_fetch());
}

fn loads(asm: &mut Asm) {
    asm.at(entry::LOAD, imm_entry(LB_BODY)); // lb
    asm.at(entry::LOAD + 1, imm_entry(LH_BODY)); // lh
    asm.at(entry::LOAD + 2, imm_entry(LW_BODY)); // lw
    asm.at(entry::LOAD + 4, imm_entry(LBU_BODY)); // lbu
    asm.at(entry::LOAD + 5, imm_entry(LHU_BODY)); // lhu
    load_body(asm, LB_BODY, MemSel::Byte, MemExtend::Sign);
    load_body(asm, LH_BODY, MemSel::HalfWord, MemExtend::Sign);
    load_body(asm, LW_BODY, MemSel::Word, MemExtend::Zero);
    load_body(asm, LBU_BODY, MemSel::Byte, MemExtend::Zero);
    load_body(asm, LHU_BODY, MemSel::HalfWord, MemExtend::Zero);
}

/// Store body: EA and store value share the ALU back to back, then the
/// aligned write runs after the alignment check has passed.
fn store_body(asm: &mut Asm, base: u8, sel: MemSel) {
    // rs1 + offset -> EA; B <- x[rs2]; A <- 0.
    asm.at(
        base,
        MicroWord {
            alu_op: AluOp::Add,
            latch_b: true,
            b_src: BSrc::Gp,
            latch_a: true,
            a_src: ASrc::Zero,
            ..nop()
        },
    );
    // Latch the EA and check it while 0 + x[rs2] flows through the ALU.
    asm.at(
        base + 1,
        MicroWord {
            latch_adr: true,
            except_ctl: ExceptCtl::LatchStoreAdr,
            mem_sel: sel,
            cond_test: CondTest::Exception,
            jmp_type: JmpType::Direct,
            target: entry::EXCEPTION,
            alu_op: AluOp::Add,
            ..nop()
        },
    );
    // Place the value into its byte lanes.
    asm.at(
        base + 2,
        MicroWord {
            latch_data: true,
            mem_sel: sel,
            ..nop()
        },
    );
    asm.at(
        base + 3,
        MicroWord {
            mem_req: true,
            write_mem: true,
            mem_sel: sel,
            cond_test: CondTest::MemValid,
            invert_test: true,
            jmp_type: JmpType::Direct,
            target: base + 3,
            ..nop()
        },
    );
    asm.at(
        base + 4,
        MicroWord {
            pc_action: PcAction::Inc,
            ..goto(entry::FETCH)
        },
    );
}

fn stores(asm: &mut Asm) {
    asm.at(entry::STORE, imm_entry(SB_BODY)); // sb
    asm.at(entry::STORE + 1, imm_entry(SH_BODY)); // sh
    asm.at(entry::STORE + 2, imm_entry(SW_BODY)); // sw
    store_body(asm, SB_BODY, MemSel::Byte);
    store_body(asm, SH_BODY, MemSel::HalfWord);
    store_body(asm, SW_BODY, MemSel::Word);
}

/// An OP entry latches B <- x[rs2] and tails into the shared body.
fn op_entry(body: u8) -> MicroWord {
    MicroWord {
        latch_b: true,
        b_src: BSrc::Gp,
        ..goto(body)
    }
}

/// Two-word compute body shared by OP and OP-IMM: run the operation, bump
/// the PC, write rd.
fn alu_body(asm: &mut Asm, base: u8, op: AluOp, imod: AluIMod) {
    asm.at(
        base,
        MicroWord {
            alu_op: op,
            alu_i_mod: imod,
            pc_action: PcAction::Inc,
            ..nop()
        },
    );
    asm.at(base + 1, writeback_and_fetch());
}

fn alu_ops(asm: &mut Asm) {
    // OP-IMM entries (B <- immediate).
    asm.at(entry::OP_IMM, imm_entry(ADD_BODY)); // addi
    asm.at(entry::OP_IMM + 2, imm_entry(SLT_BODY)); // slti
    asm.at(entry::OP_IMM + 3, imm_entry(SLTU_BODY)); // sltiu
    asm.at(entry::OP_IMM + 4, imm_entry(XOR_BODY)); // xori
    asm.at(entry::OP_IMM + 6, imm_entry(OR_BODY)); // ori
    asm.at(entry::OP_IMM + 7, imm_entry(AND_BODY)); // andi
    // OP entries (B <- x[rs2]).
    asm.at(entry::OP, op_entry(ADD_BODY)); // add
    asm.at(entry::OP + 2, op_entry(SLT_BODY)); // slt
    asm.at(entry::OP + 3, op_entry(SLTU_BODY)); // sltu
    asm.at(entry::OP + 4, op_entry(XOR_BODY)); // xor
    asm.at(entry::OP + 6, op_entry(OR_BODY)); // or
    asm.at(entry::OP + 7, op_entry(AND_BODY)); // and
    asm.at(entry::OP + 8, op_entry(SUB_BODY)); // sub
    // Shared bodies. Signed less-than is the unsigned comparator with both
    // sign bits inverted.
    alu_body(asm, ADD_BODY, AluOp::Add, AluIMod::None);
    alu_body(asm, SLT_BODY, AluOp::CmpLtu, AluIMod::InvMsbAB);
    alu_body(asm, SLTU_BODY, AluOp::CmpLtu, AluIMod::None);
    alu_body(asm, XOR_BODY, AluOp::Xor, AluIMod::None);
    alu_body(asm, OR_BODY, AluOp::Or, AluIMod::None);
    alu_body(asm, AND_BODY, AluOp::And, AluIMod::None);
    alu_body(asm, SUB_BODY, AluOp::Sub, AluIMod::None);
}

/// A shift entry latches B <- count source and restarts the rs1 read; the
/// value is picked up again during setup.
fn shift_entry(body: u8, count: BSrc) -> MicroWord {
    MicroWord {
        latch_b: true,
        b_src: count,
        reg_read: true,
        reg_r_sel: RegRSel::InsnRs1,
        ..goto(body)
    }
}

/// One-bit-per-tick shift loop.
///
/// Setup stages the count through the ALU into a loop counter and parks
/// the initial value in rd (covering shift-by-zero), then each iteration
/// alternates a shift tick with a decrement tick, writing rd as it goes.
/// The low-five-bits test makes the loop count mod 32, so register-sourced
/// counts behave without masking.
fn shift_body(asm: &mut Asm, base: u8, op: AluOp) {
    // A <- 0. (B holds the count source, the rs1 port read is in flight.)
    asm.at(
        base,
        MicroWord {
            latch_a: true,
            a_src: ASrc::Zero,
            ..nop()
        },
    );
    // 0 + count -> N; B <- x[rs1] (the value to shift).
    asm.at(
        base + 1,
        MicroWord {
            alu_op: AluOp::Add,
            latch_b: true,
            b_src: BSrc::Gp,
            ..nop()
        },
    );
    // Test N mod 32 == 0 (shift by zero leaves the operand intact);
    // meanwhile 0 + value -> output, A <- N, B <- 1.
    asm.at(
        base + 2,
        MicroWord {
            alu_op: AluOp::Add,
            latch_a: true,
            a_src: ASrc::AluO,
            latch_b: true,
            b_src: BSrc::One,
            cond_test: CondTest::AluLow5Zero,
            jmp_type: JmpType::Direct,
            target: SHIFT_WB,
            ..nop()
        },
    );
    // rd <- value; N - 1 -> output; A <- value.
    asm.at(
        base + 3,
        MicroWord {
            reg_write: true,
            alu_op: AluOp::Sub,
            latch_a: true,
            a_src: ASrc::AluO,
            ..nop()
        },
    );
    // Loop head: remaining count is on the output. Exit after this
    // tick's shift when it hits zero mod 32; A <- remaining count.
    asm.at(
        base + 4,
        MicroWord {
            alu_op: op,
            latch_a: true,
            a_src: ASrc::AluO,
            cond_test: CondTest::AluLow5Zero,
            jmp_type: JmpType::Direct,
            target: SHIFT_WB,
            ..nop()
        },
    );
    // rd <- shifted value; count - 1 -> output; A <- shifted value.
    asm.at(
        base + 5,
        MicroWord {
            reg_write: true,
            alu_op: AluOp::Sub,
            latch_a: true,
            a_src: ASrc::AluO,
            jmp_type: JmpType::Direct,
            cond_test: CondTest::True,
            target: base + 4,
            ..nop()
        },
    );
}

fn shifts(asm: &mut Asm) {
    asm.at(entry::OP_IMM + 1, shift_entry(SLL_BODY, BSrc::Imm)); // slli
    asm.at(entry::OP_IMM + 5, shift_entry(SRL_BODY, BSrc::Imm)); // srli
    asm.at(entry::OP_IMM + 0xD, shift_entry(SRA_BODY, BSrc::Imm)); // srai
    asm.at(entry::OP + 1, shift_entry(SLL_BODY, BSrc::Gp)); // sll
    asm.at(entry::OP + 5, shift_entry(SRL_BODY, BSrc::Gp)); // srl
    asm.at(entry::OP + 0xD, shift_entry(SRA_BODY, BSrc::Gp)); // sra
    shift_body(asm, SLL_BODY, AluOp::Sll);
    shift_body(asm, SRL_BODY, AluOp::Srl);
    shift_body(asm, SRA_BODY, AluOp::Sra);
    asm.at(
        SHIFT_WB,
        MicroWord {
            reg_write: true,
            pc_action: PcAction::Inc,
            ..goto(entry::FETCH)
        },
    );
}

/// Branch body: one compare tick, then a sense tick that either tails to
/// the shared taken path (staging offset and PC) or to the not-taken path.
fn branch_body(asm: &mut Asm, base: u8, op: AluOp, imod: AluIMod, invert: bool) {
    asm.at(
        base,
        MicroWord {
            alu_op: op,
            alu_i_mod: imod,
            ..nop()
        },
    );
    asm.at(
        base + 1,
        MicroWord {
            cond_test: CondTest::AluZero,
            invert_test: invert,
            jmp_type: JmpType::Direct,
            target: BR_TAKEN,
            latch_a: true,
            a_src: ASrc::Imm,
            latch_b: true,
            b_src: BSrc::Pc,
            ..nop()
        },
    );
    asm.at(base + 2, goto(BR_NOT_TAKEN));
}

fn branches(asm: &mut Asm) {
    asm.at(entry::BRANCH, op_entry(BEQ_BODY)); // beq
    asm.at(entry::BRANCH + 1, op_entry(BNE_BODY)); // bne
    asm.at(entry::BRANCH + 4, op_entry(BLT_BODY)); // blt
    asm.at(entry::BRANCH + 5, op_entry(BGE_BODY)); // bge
    asm.at(entry::BRANCH + 6, op_entry(BLTU_BODY)); // bltu
    asm.at(entry::BRANCH + 7, op_entry(BGEU_BODY)); // bgeu
    branch_body(asm, BEQ_BODY, AluOp::Sub, AluIMod::None, false);
    branch_body(asm, BNE_BODY, AluOp::Sub, AluIMod::None, true);
    branch_body(asm, BLT_BODY, AluOp::CmpLtu, AluIMod::InvMsbAB, true);
    branch_body(asm, BGE_BODY, AluOp::CmpLtu, AluIMod::InvMsbAB, false);
    branch_body(asm, BLTU_BODY, AluOp::CmpLtu, AluIMod::None, true);
    branch_body(asm, BGEU_BODY, AluOp::CmpLtu, AluIMod::None, false);
    // Taken: offset + PC -> target.
    asm.at(
        BR_TAKEN,
        MicroWord {
            alu_op: AluOp::Add,
            ..nop()
        },
    );
    // Target misalignment traps before the PC moves; the recompute keeps
    // the target on the output for the load tick.
    asm.at(
        BR_TAKEN + 1,
        MicroWord {
            except_ctl: ExceptCtl::LatchJumpTarget,
            cond_test: CondTest::Exception,
            jmp_type: JmpType::Direct,
            target: entry::EXCEPTION,
            alu_op: AluOp::Add,
            ..nop()
        },
    );
    asm.at(
        BR_TAKEN + 2,
        MicroWord {
            pc_action: PcAction::LoadAluO,
            ..goto(entry::FETCH)
        },
    );
    asm.at(
        BR_NOT_TAKEN,
        MicroWord {
            pc_action: PcAction::Inc,
            ..goto(entry::FETCH)
        },
    );
}

fn jumps(asm: &mut Asm) {
    // JAL: target = PC + J-imm, link = PC + 4.
    asm.at(
        entry::JAL,
        MicroWord {
            latch_a: true,
            a_src: ASrc::Imm,
            latch_b: true,
            b_src: BSrc::Pc,
            ..nop()
        },
    );
    asm.at(
        entry::JAL + 1,
        MicroWord {
            alu_op: AluOp::Add,
            ..nop()
        },
    );
    asm.at(
        entry::JAL + 2,
        MicroWord {
            except_ctl: ExceptCtl::LatchJumpTarget,
            cond_test: CondTest::Exception,
            jmp_type: JmpType::Direct,
            target: entry::EXCEPTION,
            alu_op: AluOp::Add,
            ..nop()
        },
    );
    // PC <- target; stage 4 for the link sum. B still holds the old PC.
    asm.at(
        entry::JAL + 3,
        MicroWord {
            pc_action: PcAction::LoadAluO,
            latch_a: true,
            a_src: ASrc::Four,
            ..nop()
        },
    );
    asm.at(
        entry::JAL + 4,
        MicroWord {
            alu_op: AluOp::Add,
            ..nop()
        },
    );
    asm.at(entry::JAL + 5, writeback_and_fetch());
    // JALR: target = (x[rs1] + I-imm) with bit 0 cleared.
    asm.at(
        entry::JALR,
        MicroWord {
            latch_b: true,
            b_src: BSrc::Imm,
            ..nop()
        },
    );
    asm.at(
        entry::JALR + 1,
        MicroWord {
            alu_op: AluOp::Add,
            alu_o_mod: AluOMod::ClearLsb,
            ..nop()
        },
    );
    asm.at(
        entry::JALR + 2,
        MicroWord {
            except_ctl: ExceptCtl::LatchJumpTarget,
            cond_test: CondTest::Exception,
            jmp_type: JmpType::Direct,
            target: entry::EXCEPTION,
            alu_op: AluOp::Add,
            alu_o_mod: AluOMod::ClearLsb,
            ..nop()
        },
    );
    // PC <- target; B <- the outgoing PC for the link sum.
    asm.at(
        entry::JALR + 3,
        MicroWord {
            pc_action: PcAction::LoadAluO,
            latch_a: true,
            a_src: ASrc::Four,
            latch_b: true,
            b_src: BSrc::Pc,
            ..nop()
        },
    );
    asm.at(
        entry::JALR + 4,
        MicroWord {
            alu_op: AluOp::Add,
            ..nop()
        },
    );
    asm.at(entry::JALR + 5, writeback_and_fetch());
}

fn upper_immediates(asm: &mut Asm) {
    // AUIPC: rd = PC + U-imm.
    asm.at(
        entry::AUIPC,
        MicroWord {
            latch_a: true,
            a_src: ASrc::Imm,
            latch_b: true,
            b_src: BSrc::Pc,
            ..nop()
        },
    );
    asm.at(
        entry::AUIPC + 1,
        MicroWord {
            alu_op: AluOp::Add,
            pc_action: PcAction::Inc,
            ..nop()
        },
    );
    asm.at(entry::AUIPC + 2, writeback_and_fetch());
    // LUI: rd = U-imm.
    asm.at(
        entry::LUI,
        MicroWord {
            latch_a: true,
            a_src: ASrc::Zero,
            latch_b: true,
            b_src: BSrc::Imm,
            ..nop()
        },
    );
    asm.at(
        entry::LUI + 1,
        MicroWord {
            alu_op: AluOp::Add,
            pc_action: PcAction::Inc,
            ..nop()
        },
    );
    asm.at(entry::LUI + 2, writeback_and_fetch());
}

/// A CSR entry that begins with a CSR read and tails into `body`.
fn csr_read_entry(body: u8) -> MicroWord {
    MicroWord {
        csr_op: CsrOp::Read,
        csr_sel: CsrSel::Insn,
        ..goto(body)
    }
}

/// Shared final word of the writing CSR routines.
fn csr_write_and_fetch() -> MicroWord {
    MicroWord {
        csr_op: CsrOp::Write,
        csr_sel: CsrSel::Insn,
        pc_action: PcAction::Inc,
        ..goto(entry::FETCH)
    }
}

fn csr_ops(asm: &mut Asm) {
    // Holding slot while the second decode cycle classifies the CSR; the
    // verdict (and any pending IRQ) is checked exactly like dispatch.
    asm.at(
        entry::CSR_DECODE,
        MicroWord {
            except_ctl: ExceptCtl::LatchDecoder,
            cond_test: CondTest::Exception,
            jmp_type: JmpType::Map,
            target: entry::EXCEPTION,
            ..nop()
        },
    );
    // Read-only zero: rd <- 0, any write is dropped.
    asm.at(
        entry::CSR_RO0,
        MicroWord {
            latch_a: true,
            a_src: ASrc::Zero,
            ..goto(CSR_RO0_BODY)
        },
    );
    asm.at(
        CSR_RO0_BODY,
        MicroWord {
            alu_op: AluOp::And,
            ..nop()
        },
    );
    asm.at(
        CSR_RO0_BODY + 1,
        MicroWord {
            reg_write: true,
            pc_action: PcAction::Inc,
            ..goto(entry::FETCH)
        },
    );
    // csrw (CSRRW, rd = x0): no read side effect, just write x[rs1].
    asm.at(
        entry::CSR_W,
        MicroWord {
            reg_read: true,
            reg_r_sel: RegRSel::InsnRs1,
            latch_a: true,
            a_src: ASrc::Zero,
            ..goto(CSR_W_BODY)
        },
    );
    asm.at(
        CSR_W_BODY,
        MicroWord {
            latch_b: true,
            b_src: BSrc::Gp,
            ..nop()
        },
    );
    asm.at(
        CSR_W_BODY + 1,
        MicroWord {
            alu_op: AluOp::Add,
            ..nop()
        },
    );
    asm.at(CSR_W_BODY + 2, csr_write_and_fetch());
    // csrrw: old -> rd, x[rs1] -> CSR.
    asm.at(entry::CSR_RW, csr_read_entry(CSR_RW_BODY));
    asm.at(
        CSR_RW_BODY,
        MicroWord {
            latch_b: true,
            b_src: BSrc::Csr,
            latch_a: true,
            a_src: ASrc::Zero,
            reg_read: true,
            reg_r_sel: RegRSel::InsnRs1,
            ..nop()
        },
    );
    asm.at(
        CSR_RW_BODY + 1,
        MicroWord {
            alu_op: AluOp::Add,
            latch_b: true,
            b_src: BSrc::Gp,
            ..nop()
        },
    );
    asm.at(
        CSR_RW_BODY + 2,
        MicroWord {
            reg_write: true,
            alu_op: AluOp::Add,
            ..nop()
        },
    );
    asm.at(CSR_RW_BODY + 3, csr_write_and_fetch());
    // csrr: pure read (covers the set/clear forms with a zero mask).
    asm.at(entry::CSR_R, csr_read_entry(CSR_R_BODY));
    asm.at(
        CSR_R_BODY,
        MicroWord {
            latch_b: true,
            b_src: BSrc::Csr,
            latch_a: true,
            a_src: ASrc::Zero,
            ..nop()
        },
    );
    asm.at(
        CSR_R_BODY + 1,
        MicroWord {
            alu_op: AluOp::Add,
            pc_action: PcAction::Inc,
            ..nop()
        },
    );
    asm.at(CSR_R_BODY + 2, writeback_and_fetch());
    // csrrs: old -> rd, old | x[rs1] -> CSR.
    asm.at(entry::CSR_RS, csr_read_entry(CSR_RS_BODY));
    asm.at(
        CSR_RS_BODY,
        MicroWord {
            latch_b: true,
            b_src: BSrc::Csr,
            latch_a: true,
            a_src: ASrc::Zero,
            reg_read: true,
            reg_r_sel: RegRSel::InsnRs1,
            ..nop()
        },
    );
    asm.at(
        CSR_RS_BODY + 1,
        MicroWord {
            alu_op: AluOp::Add,
            latch_a: true,
            a_src: ASrc::Gp,
            ..nop()
        },
    );
    asm.at(
        CSR_RS_BODY + 2,
        MicroWord {
            reg_write: true,
            alu_op: AluOp::Or,
            ..nop()
        },
    );
    asm.at(CSR_RS_BODY + 3, csr_write_and_fetch());
    // csrrc: old -> rd, old & !x[rs1] -> CSR, composed as
    // old XOR (old AND mask) since only A has an output feedback path.
    asm.at(entry::CSR_RC, csr_read_entry(CSR_RC_BODY));
    asm.at(
        CSR_RC_BODY,
        MicroWord {
            latch_b: true,
            b_src: BSrc::Csr,
            latch_a: true,
            a_src: ASrc::Zero,
            reg_read: true,
            reg_r_sel: RegRSel::InsnRs1,
            ..nop()
        },
    );
    asm.at(
        CSR_RC_BODY + 1,
        MicroWord {
            alu_op: AluOp::Add,
            latch_a: true,
            a_src: ASrc::Gp,
            ..nop()
        },
    );
    asm.at(
        CSR_RC_BODY + 2,
        MicroWord {
            reg_write: true,
            alu_op: AluOp::And,
            ..nop()
        },
    );
    asm.at(
        CSR_RC_BODY + 3,
        MicroWord {
            alu_op: AluOp::And,
            latch_a: true,
            a_src: ASrc::AluO,
            ..nop()
        },
    );
    asm.at(
        CSR_RC_BODY + 4,
        MicroWord {
            alu_op: AluOp::Xor,
            ..nop()
        },
    );
    asm.at(CSR_RC_BODY + 5, csr_write_and_fetch());
    // csrwi (CSRRWI, rd = x0): write the zero-extended immediate.
    asm.at(
        entry::CSR_WI,
        MicroWord {
            latch_b: true,
            b_src: BSrc::CsrImm,
            latch_a: true,
            a_src: ASrc::Zero,
            ..goto(CSR_WI_BODY)
        },
    );
    asm.at(
        CSR_WI_BODY,
        MicroWord {
            alu_op: AluOp::Add,
            ..nop()
        },
    );
    asm.at(CSR_WI_BODY + 1, csr_write_and_fetch());
    // csrrwi: old -> rd, uimm -> CSR.
    asm.at(entry::CSR_RWI, csr_read_entry(CSR_RWI_BODY));
    asm.at(
        CSR_RWI_BODY,
        MicroWord {
            latch_b: true,
            b_src: BSrc::Csr,
            latch_a: true,
            a_src: ASrc::Zero,
            ..nop()
        },
    );
    asm.at(
        CSR_RWI_BODY + 1,
        MicroWord {
            alu_op: AluOp::Add,
            latch_b: true,
            b_src: BSrc::CsrImm,
            ..nop()
        },
    );
    asm.at(
        CSR_RWI_BODY + 2,
        MicroWord {
            reg_write: true,
            alu_op: AluOp::Add,
            ..nop()
        },
    );
    asm.at(CSR_RWI_BODY + 3, csr_write_and_fetch());
    // csrrsi: old -> rd, old | uimm -> CSR.
    asm.at(entry::CSR_RSI, csr_read_entry(CSR_RSI_BODY));
    asm.at(
        CSR_RSI_BODY,
        MicroWord {
            latch_b: true,
            b_src: BSrc::Csr,
            latch_a: true,
            a_src: ASrc::Zero,
            ..nop()
        },
    );
    asm.at(
        CSR_RSI_BODY + 1,
        MicroWord {
            alu_op: AluOp::Add,
            latch_b: true,
            b_src: BSrc::CsrImm,
            ..nop()
        },
    );
    asm.at(
        CSR_RSI_BODY + 2,
        MicroWord {
            reg_write: true,
            latch_a: true,
            a_src: ASrc::AluO,
            ..nop()
        },
    );
    asm.at(
        CSR_RSI_BODY + 3,
        MicroWord {
            alu_op: AluOp::Or,
            ..nop()
        },
    );
    asm.at(CSR_RSI_BODY + 4, csr_write_and_fetch());
    // csrrci: old -> rd, old & !uimm -> CSR, same composition as csrrc.
    asm.at(entry::CSR_RCI, csr_read_entry(CSR_RCI_BODY));
    asm.at(
        CSR_RCI_BODY,
        MicroWord {
            latch_b: true,
            b_src: BSrc::Csr,
            latch_a: true,
            a_src: ASrc::Zero,
            ..nop()
        },
    );
    asm.at(
        CSR_RCI_BODY + 1,
        MicroWord {
            alu_op: AluOp::Add,
            ..nop()
        },
    );
    asm.at(
        CSR_RCI_BODY + 2,
        MicroWord {
            reg_write: true,
            latch_a: true,
            a_src: ASrc::AluO,
            latch_b: true,
            b_src: BSrc::CsrImm,
            ..nop()
        },
    );
    asm.at(
        CSR_RCI_BODY + 3,
        MicroWord {
            alu_op: AluOp::And,
            ..nop()
        },
    );
    asm.at(
        CSR_RCI_BODY + 4,
        MicroWord {
            alu_op: AluOp::And,
            latch_a: true,
            a_src: ASrc::AluO,
            latch_b: true,
            b_src: BSrc::Csr,
            ..nop()
        },
    );
    asm.at(
        CSR_RCI_BODY + 5,
        MicroWord {
            alu_op: AluOp::Xor,
            ..nop()
        },
    );
    asm.at(CSR_RCI_BODY + 6, csr_write_and_fetch());
}

fn traps(asm: &mut Asm) {
    // Trap entry. MPIE <- MIE / MIE <- 0 happens first, while MTVEC is
    // read; then MEPC <- PC and MCAUSE <- the routed cause, and the PC
    // loads the handler base. The faulting instruction never retires: the
    // PC has not moved, so MEPC captures its address.
    asm.at(
        entry::EXCEPTION,
        MicroWord {
            except_ctl: ExceptCtl::EnterTrap,
            csr_op: CsrOp::Read,
            csr_sel: CsrSel::Target,
            target: csr::index::MTVEC,
            ..nop()
        },
    );
    asm.at(
        entry::EXCEPTION + 1,
        MicroWord {
            latch_b: true,
            b_src: BSrc::Pc,
            latch_a: true,
            a_src: ASrc::Zero,
            ..nop()
        },
    );
    asm.at(
        entry::EXCEPTION + 2,
        MicroWord {
            alu_op: AluOp::Add,
            ..nop()
        },
    );
    asm.at(
        entry::EXCEPTION + 3,
        MicroWord {
            csr_op: CsrOp::Write,
            csr_sel: CsrSel::Target,
            target: csr::index::MEPC,
            latch_b: true,
            b_src: BSrc::McauseLatch,
            ..nop()
        },
    );
    asm.at(
        entry::EXCEPTION + 4,
        MicroWord {
            alu_op: AluOp::Add,
            ..nop()
        },
    );
    asm.at(
        entry::EXCEPTION + 5,
        MicroWord {
            csr_op: CsrOp::Write,
            csr_sel: CsrSel::Target,
            target: csr::index::MCAUSE,
            latch_b: true,
            b_src: BSrc::Csr,
            ..nop()
        },
    );
    asm.at(
        entry::EXCEPTION + 6,
        MicroWord {
            alu_op: AluOp::Add,
            ..nop()
        },
    );
    asm.at(
        entry::EXCEPTION + 7,
        MicroWord {
            pc_action: PcAction::LoadAluO,
            ..goto(entry::FETCH)
        },
    );
    // MRET: PC <- MEPC, MIE <- MPIE, MPIE <- 1.
    asm.at(
        entry::MRET,
        MicroWord {
            csr_op: CsrOp::Read,
            csr_sel: CsrSel::Target,
            target: csr::index::MEPC,
            ..nop()
        },
    );
    asm.at(
        entry::MRET + 1,
        MicroWord {
            latch_b: true,
            b_src: BSrc::Csr,
            latch_a: true,
            a_src: ASrc::Zero,
            ..nop()
        },
    );
    asm.at(
        entry::MRET + 2,
        MicroWord {
            alu_op: AluOp::Add,
            ..nop()
        },
    );
    asm.at(
        entry::MRET + 3,
        MicroWord {
            except_ctl: ExceptCtl::LeaveTrap,
            pc_action: PcAction::LoadAluO,
            ..goto(entry::FETCH)
        },
    );
}

/// Tiny positional assembler: tracks occupancy so a misplaced routine is a
/// build failure, and backfills every unassigned slot with a panic jump.
struct Asm {
    words: [Option<MicroWord>; ROM_DEPTH],
}

impl Asm {
    fn new() -> Self {
        Self {
            words: [None; ROM_DEPTH],
        }
    }

    fn at(&mut self, address: u8, word: MicroWord) {
        let slot = &mut self.words[address as usize];
        if slot.is_some() {
            panic!("microcode address {address:#04x} assigned twice");
        }
        *slot = Some(word);
    }

    fn finish(self) -> [MicroWord; ROM_DEPTH] {
        self.words.map(|slot| slot.unwrap_or_else(|| goto(entry::PANIC)))
    }
}
