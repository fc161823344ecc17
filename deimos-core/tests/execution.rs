//! End-to-end execution tests: programs run on a board through the full
//! microcoded fetch/decode/dispatch/commit path.

use deimos_core::board::Board;
use deimos_core::bus::{Bus, MasterSignals, SlaveSignals};
use deimos_core::core::{csr, Config, Core};
use deimos_core::registers::Specifier;
use deimos_core::resources::ram::Ram;
use deimos_core::rvfi::Retirement;

const MAX_TICKS: usize = 4000;

fn x(index: u8) -> Specifier {
    Specifier::from_bits(index as u32)
}

//
// Instruction encoders. rd/rs are plain register indices; immediates are
// signed where the format is.
//

fn r_type(funct7: u32, rs2: u8, rs1: u8, funct3: u32, rd: u8, opcode: u32) -> u32 {
    funct7 << 25 | (rs2 as u32) << 20 | (rs1 as u32) << 15 | funct3 << 12 | (rd as u32) << 7 | opcode
}

fn i_type(imm: i32, rs1: u8, funct3: u32, rd: u8, opcode: u32) -> u32 {
    (imm as u32 & 0xFFF) << 20 | (rs1 as u32) << 15 | funct3 << 12 | (rd as u32) << 7 | opcode
}

fn s_type(imm: i32, rs2: u8, rs1: u8, funct3: u32) -> u32 {
    let imm = imm as u32 & 0xFFF;
    (imm >> 5) << 25 | (rs2 as u32) << 20 | (rs1 as u32) << 15 | funct3 << 12 | (imm & 0x1F) << 7 | 0x23
}

fn b_type(offset: i32, rs2: u8, rs1: u8, funct3: u32) -> u32 {
    let imm = offset as u32 & 0x1FFF;
    (imm >> 12) << 31
        | ((imm >> 5) & 0x3F) << 25
        | (rs2 as u32) << 20
        | (rs1 as u32) << 15
        | funct3 << 12
        | ((imm >> 1) & 0xF) << 8
        | ((imm >> 11) & 1) << 7
        | 0x63
}

fn addi(rd: u8, rs1: u8, imm: i32) -> u32 {
    i_type(imm, rs1, 0b000, rd, 0x13)
}

fn slli(rd: u8, rs1: u8, shamt: u8) -> u32 {
    r_type(0, shamt, rs1, 0b001, rd, 0x13)
}

fn srli(rd: u8, rs1: u8, shamt: u8) -> u32 {
    r_type(0, shamt, rs1, 0b101, rd, 0x13)
}

fn srai(rd: u8, rs1: u8, shamt: u8) -> u32 {
    r_type(0b0100000, shamt, rs1, 0b101, rd, 0x13)
}

fn lui(rd: u8, imm20: u32) -> u32 {
    imm20 << 12 | (rd as u32) << 7 | 0x37
}

fn add(rd: u8, rs1: u8, rs2: u8) -> u32 {
    r_type(0, rs2, rs1, 0b000, rd, 0x33)
}

fn sub(rd: u8, rs1: u8, rs2: u8) -> u32 {
    r_type(0b0100000, rs2, rs1, 0b000, rd, 0x33)
}

fn slt(rd: u8, rs1: u8, rs2: u8) -> u32 {
    r_type(0, rs2, rs1, 0b010, rd, 0x33)
}

fn sltu(rd: u8, rs1: u8, rs2: u8) -> u32 {
    r_type(0, rs2, rs1, 0b011, rd, 0x33)
}

fn xor(rd: u8, rs1: u8, rs2: u8) -> u32 {
    r_type(0, rs2, rs1, 0b100, rd, 0x33)
}

fn sll(rd: u8, rs1: u8, rs2: u8) -> u32 {
    r_type(0, rs2, rs1, 0b001, rd, 0x33)
}

fn srl(rd: u8, rs1: u8, rs2: u8) -> u32 {
    r_type(0, rs2, rs1, 0b101, rd, 0x33)
}

fn sra(rd: u8, rs1: u8, rs2: u8) -> u32 {
    r_type(0b0100000, rs2, rs1, 0b101, rd, 0x33)
}

fn lb(rd: u8, rs1: u8, offset: i32) -> u32 {
    i_type(offset, rs1, 0b000, rd, 0x03)
}

fn lh(rd: u8, rs1: u8, offset: i32) -> u32 {
    i_type(offset, rs1, 0b001, rd, 0x03)
}

fn lw(rd: u8, rs1: u8, offset: i32) -> u32 {
    i_type(offset, rs1, 0b010, rd, 0x03)
}

fn lbu(rd: u8, rs1: u8, offset: i32) -> u32 {
    i_type(offset, rs1, 0b100, rd, 0x03)
}

fn lhu(rd: u8, rs1: u8, offset: i32) -> u32 {
    i_type(offset, rs1, 0b101, rd, 0x03)
}

fn sb(rs2: u8, rs1: u8, offset: i32) -> u32 {
    s_type(offset, rs2, rs1, 0b000)
}

fn sh(rs2: u8, rs1: u8, offset: i32) -> u32 {
    s_type(offset, rs2, rs1, 0b001)
}

fn sw(rs2: u8, rs1: u8, offset: i32) -> u32 {
    s_type(offset, rs2, rs1, 0b010)
}

fn beq(rs1: u8, rs2: u8, offset: i32) -> u32 {
    b_type(offset, rs2, rs1, 0b000)
}

fn bne(rs1: u8, rs2: u8, offset: i32) -> u32 {
    b_type(offset, rs2, rs1, 0b001)
}

fn blt(rs1: u8, rs2: u8, offset: i32) -> u32 {
    b_type(offset, rs2, rs1, 0b100)
}

fn bgeu(rs1: u8, rs2: u8, offset: i32) -> u32 {
    b_type(offset, rs2, rs1, 0b111)
}

fn jal(rd: u8, offset: i32) -> u32 {
    let imm = offset as u32 & 0x1F_FFFF;
    (imm >> 20) << 31
        | ((imm >> 1) & 0x3FF) << 21
        | ((imm >> 11) & 1) << 20
        | ((imm >> 12) & 0xFF) << 12
        | (rd as u32) << 7
        | 0x6F
}

fn jalr(rd: u8, rs1: u8, offset: i32) -> u32 {
    i_type(offset, rs1, 0b000, rd, 0x67)
}

fn csrrw(rd: u8, specifier: u16, rs1: u8) -> u32 {
    i_type(specifier as i32, rs1, 0b001, rd, 0x73)
}

fn csrrs(rd: u8, specifier: u16, rs1: u8) -> u32 {
    i_type(specifier as i32, rs1, 0b010, rd, 0x73)
}

fn csrrc(rd: u8, specifier: u16, rs1: u8) -> u32 {
    i_type(specifier as i32, rs1, 0b011, rd, 0x73)
}

fn csrrwi(rd: u8, specifier: u16, uimm: u8) -> u32 {
    i_type(specifier as i32, uimm, 0b101, rd, 0x73)
}

fn csrrsi(rd: u8, specifier: u16, uimm: u8) -> u32 {
    i_type(specifier as i32, uimm, 0b110, rd, 0x73)
}

fn csrrci(rd: u8, specifier: u16, uimm: u8) -> u32 {
    i_type(specifier as i32, uimm, 0b111, rd, 0x73)
}

const ECALL: u32 = 0x0000_0073;
const MRET: u32 = 0x3020_0073;

fn board_with(program: &[u32]) -> Board {
    let mut board = Board::new().unwrap();
    board.load_words(0, program);
    board
}

fn run(program: &[u32], retirements: usize) -> (Board, Vec<Retirement>) {
    let mut board = board_with(program);
    let retired = board.run_retirements(retirements, MAX_TICKS);
    assert_eq!(retirements, retired.len(), "program did not retire fully");
    (board, retired)
}

#[test]
fn addi_chain() {
    let program = [addi(1, 0, 5), addi(2, 1, -3), addi(3, 2, 7)];
    let (board, retired) = run(&program, 3);
    assert_eq!(5, board.core().x(x(1)));
    assert_eq!(2, board.core().x(x(2)));
    assert_eq!(9, board.core().x(x(3)));
    assert_eq!(0x0C, board.core().pc());
    // Retirement bookkeeping for the first instruction.
    assert_eq!(0, retired[0].order);
    assert_eq!(program[0], retired[0].insn);
    assert_eq!(1, retired[0].rd_addr);
    assert_eq!(5, retired[0].rd_wdata);
    assert_eq!(0, retired[0].pc_rdata);
    assert_eq!(4, retired[0].pc_wdata);
    assert_eq!(3, retired[0].mode);
    assert_eq!(1, retired[0].ixl);
    assert!(retired.iter().all(|r| !r.trap && !r.intr));
    assert_eq!(vec![0, 1, 2], retired.iter().map(|r| r.order).collect::<Vec<_>>());
}

#[test]
fn signed_vs_unsigned_compare() {
    let program = [
        addi(1, 0, -1),
        addi(2, 0, 1),
        slt(3, 1, 2),
        sltu(4, 1, 2),
    ];
    let (board, _) = run(&program, 4);
    assert_eq!(0xFFFF_FFFF, board.core().x(x(1)));
    assert_eq!(1, board.core().x(x(3)));
    assert_eq!(0, board.core().x(x(4)));
}

#[test]
fn shift_by_zero_leaves_operand_intact() {
    let program = [
        addi(1, 0, 0x5A),
        slli(2, 1, 0),
        srli(3, 1, 0),
        srai(4, 1, 0),
    ];
    let (board, _) = run(&program, 4);
    assert_eq!(0x5A, board.core().x(x(2)));
    assert_eq!(0x5A, board.core().x(x(3)));
    assert_eq!(0x5A, board.core().x(x(4)));
}

#[test]
fn shifts_match_a_barrel_shifter() {
    // Materialize 0xDEADBEEF: lui + addi with the sign adjustment.
    let value: u32 = 0xDEAD_BEEF;
    for shamt in [1u8, 5, 12, 31] {
        let program = [
            lui(1, 0xDEADC),
            addi(1, 1, -273),
            slli(2, 1, shamt),
            srli(3, 1, shamt),
            srai(4, 1, shamt),
        ];
        let (board, _) = run(&program, 5);
        assert_eq!(value, board.core().x(x(1)));
        assert_eq!(value << shamt, board.core().x(x(2)), "slli {shamt}");
        assert_eq!(value >> shamt, board.core().x(x(3)), "srli {shamt}");
        assert_eq!(
            (value as i32 >> shamt) as u32,
            board.core().x(x(4)),
            "srai {shamt}"
        );
    }
}

#[test]
fn register_shifts_count_mod_32() {
    let program = [
        addi(1, 0, 0x5A),
        addi(2, 0, 33),
        sll(3, 1, 2),
        srl(4, 1, 2),
        addi(5, 0, 32),
        sll(6, 1, 5),
    ];
    let (board, _) = run(&program, 6);
    assert_eq!(0x5A << 1, board.core().x(x(3)));
    assert_eq!(0x5A >> 1, board.core().x(x(4)));
    assert_eq!(0x5A, board.core().x(x(6)));
}

#[test]
fn load_store_byte_with_sign_extension() {
    let program = [
        addi(1, 0, -1),
        sb(1, 0, 0x40),
        lb(2, 0, 0x40),
        lbu(3, 0, 0x40),
    ];
    let (board, retired) = run(&program, 4);
    assert_eq!(0xFF, board.core().bus().word(0x40) & 0xFF);
    assert_eq!(0xFFFF_FFFF, board.core().x(x(2)));
    assert_eq!(0x0000_00FF, board.core().x(x(3)));
    // The store's trace shows the byte lane it drove.
    assert_eq!(0x40, retired[1].mem_addr);
    assert_eq!(0b0001, retired[1].mem_wmask);
    assert_eq!(0, retired[1].mem_rmask);
    assert_eq!(0b0001, retired[2].mem_rmask);
}

#[test]
fn memory_round_trips_all_widths() {
    let program = [
        lui(1, 0x12345),
        addi(1, 1, 0x678),
        sw(1, 0, 0x40),
        lw(2, 0, 0x40),
        sh(1, 0, 0x4A),
        lh(3, 0, 0x4A),
        lhu(4, 0, 0x4A),
        sb(1, 0, 0x45),
        lb(5, 0, 0x45),
    ];
    let (board, _) = run(&program, 9);
    let value = 0x1234_5678;
    assert_eq!(value, board.core().x(x(1)));
    assert_eq!(value, board.core().x(x(2)));
    assert_eq!(0x5678, board.core().x(x(3)));
    assert_eq!(0x5678, board.core().x(x(4)));
    assert_eq!(0x78, board.core().x(x(5)));
}

#[test]
fn halfword_sign_extension() {
    let program = [
        addi(1, 0, -2), // 0xFFFFFFFE
        sh(1, 0, 0x40),
        lh(2, 0, 0x40),
        lhu(3, 0, 0x40),
    ];
    let (board, _) = run(&program, 4);
    assert_eq!(0xFFFF_FFFE, board.core().x(x(2)));
    assert_eq!(0x0000_FFFE, board.core().x(x(3)));
}

#[test]
fn branch_taken_and_not_taken() {
    let program = [
        addi(1, 0, 1),
        addi(2, 0, 1),
        beq(1, 2, 8),
        addi(3, 0, 99),
        addi(4, 0, 42),
    ];
    // beq skips the addi x3; four instructions retire.
    let (board, retired) = run(&program, 4);
    assert_eq!(0, board.core().x(x(3)));
    assert_eq!(42, board.core().x(x(4)));
    assert_eq!(0x14, board.core().pc());
    // The taken branch's PC delta is visible in the trace.
    assert_eq!(0x08, retired[2].pc_rdata);
    assert_eq!(0x10, retired[2].pc_wdata);
}

#[test]
fn more_branch_senses() {
    let program = [
        addi(1, 0, -5),
        addi(2, 0, 3),
        blt(1, 2, 8), // signed: taken
        addi(3, 0, 1),
        bgeu(1, 2, 8), // unsigned: -5 is huge, taken
        addi(4, 0, 1),
        bne(1, 1, 8), // not taken
        addi(5, 0, 1),
    ];
    let (board, _) = run(&program, 6);
    assert_eq!(0, board.core().x(x(3)));
    assert_eq!(0, board.core().x(x(4)));
    assert_eq!(1, board.core().x(x(5)));
}

#[test]
fn jal_and_jalr_link_and_jump() {
    let program = [
        jal(1, 8),      // 0x00: jump to 0x08, x1 = 0x04
        addi(3, 0, 99), // 0x04: skipped
        addi(4, 0, 0x14), // 0x08
        jalr(2, 4, 0),  // 0x0C: jump to 0x14, x2 = 0x10
        addi(5, 0, 99), // 0x10: skipped
        addi(6, 0, 9),  // 0x14
    ];
    let (board, _) = run(&program, 4);
    assert_eq!(0x04, board.core().x(x(1)));
    assert_eq!(0x10, board.core().x(x(2)));
    assert_eq!(0, board.core().x(x(3)));
    assert_eq!(0, board.core().x(x(5)));
    assert_eq!(9, board.core().x(x(6)));
}

#[test]
fn jalr_clears_target_bit_zero() {
    let program = [
        addi(1, 0, 0x0D), // odd target; bit 0 must be dropped
        jalr(2, 1, 0),    // 0x04: jump to 0x0C
        addi(3, 0, 99),   // 0x08: skipped
        addi(4, 0, 7),    // 0x0C
    ];
    let (board, _) = run(&program, 3);
    assert_eq!(7, board.core().x(x(4)));
    assert_eq!(0, board.core().x(x(3)));
}

#[test]
fn writes_to_x0_are_discarded() {
    let program = [addi(0, 0, 5), addi(1, 0, 3), add(0, 1, 1), addi(2, 0, 0)];
    let (board, retired) = run(&program, 4);
    assert_eq!(0, board.core().x(x(0)));
    assert_eq!(0, board.core().x(x(2)));
    // The trace never shows a nonzero write to x0.
    for r in &retired {
        if r.rd_addr == 0 {
            assert_eq!(0, r.rd_wdata);
        }
    }
}

#[test]
fn trap_on_illegal_instruction() {
    // A zero word at address 0, mtvec left at its reset value of 0.
    let (board, retired) = run(&[0x0000_0000], 1);
    let core = board.core();
    assert!(retired[0].trap);
    assert_eq!(0, retired[0].insn);
    assert_eq!(Some(2), core.csr(csr::MCAUSE));
    assert_eq!(Some(0), core.csr(csr::MEPC));
    assert_eq!(0, retired[0].pc_wdata);
}

#[test]
fn trap_sets_status_and_mepc() {
    // Handler at 0x40 bumps MEPC past the ECALL and returns.
    let mut board = Board::new().unwrap();
    board.load_words(
        0,
        &[
            addi(5, 0, 0x40),
            csrrw(0, csr::MTVEC, 5),
            csrrsi(0, csr::MSTATUS, 8), // MIE = 1
            ECALL,                      // 0x0C
            addi(1, 0, 7),              // 0x10
        ],
    );
    board.load_words(
        0x40,
        &[
            csrrs(6, csr::MEPC, 0),
            addi(6, 6, 4),
            csrrw(0, csr::MEPC, 6),
            MRET,
        ],
    );
    // main (3) + trapped ecall (1) + handler (4) + addi after return (1).
    let retired = board.run_retirements(9, MAX_TICKS);
    assert_eq!(9, retired.len());
    let core = board.core();
    assert_eq!(7, core.x(x(1)));
    let ecall = &retired[3];
    assert!(ecall.trap);
    assert_eq!(0x0C, ecall.pc_rdata);
    assert_eq!(0x40, ecall.pc_wdata);
    // The handler's first instruction is flagged as the interrupted-flow
    // entry point.
    assert!(retired[4].intr);
    assert_eq!(0x40, retired[4].pc_rdata);
    assert_eq!(Some(11), core.csr(csr::MCAUSE));
    assert_eq!(Some(0x10), core.csr(csr::MEPC));
    // MRET restored MIE from MPIE and set MPIE.
    assert_eq!(Some(0x1888), core.csr(csr::MSTATUS));
}

#[test]
fn external_irq_taken_between_instructions() {
    let mut board = Board::new().unwrap();
    board.load_words(
        0,
        &[
            addi(5, 0, 0x100),
            csrrw(0, csr::MTVEC, 5),       // mtvec = 0x100
            addi(6, 0, 1),
            slli(6, 6, 11),                // x6 = 0x800 (MEIE)
            csrrs(0, csr::MIE, 6),
            csrrsi(0, csr::MSTATUS, 8),    // MIE = 1
            addi(1, 0, 1),                 // 0x18: the last pre-IRQ insn
            addi(2, 0, 2),                 // 0x1C: preempted
            addi(3, 0, 3),                 // 0x20
        ],
    );
    board.load_words(0x100, &[addi(10, 0, 55)]);
    // Run until the instruction at 0x18 retires, then raise the line.
    let mut retired = Vec::new();
    for _ in 0..MAX_TICKS {
        if let Some(r) = board.tick() {
            let last_pc = r.pc_rdata;
            retired.push(r);
            if last_pc == 0x18 {
                board.set_irq(true);
                break;
            }
        }
    }
    assert_eq!(0x18, retired.last().unwrap().pc_rdata);
    // The next retirement must be the handler's first instruction.
    let handler = loop {
        if let Some(r) = board.tick() {
            break r;
        }
    };
    board.set_irq(false);
    assert_eq!(0x100, handler.pc_rdata);
    assert!(handler.intr);
    assert!(!handler.trap);
    let core = board.core();
    assert_eq!(55, core.x(x(10)));
    assert_eq!(Some(0x8000_000B), core.csr(csr::MCAUSE));
    // MEPC holds the next instruction that would have run.
    assert_eq!(Some(0x1C), core.csr(csr::MEPC));
    assert_eq!(Some(0x1880), core.csr(csr::MSTATUS)); // MPIE = old MIE, MIE = 0
    // The preempted instruction never executed.
    assert_eq!(0, core.x(x(2)));
}

#[test]
fn csr_read_write_set_clear() {
    let program = [
        csrrwi(0, csr::MSCRATCH, 21),
        csrrwi(8, csr::MSCRATCH, 9),   // x8 = 21
        csrrsi(0, csr::MSCRATCH, 6),   // 9 | 6 = 15
        csrrci(0, csr::MSCRATCH, 1),   // 15 & !1 = 14
        csrrs(9, csr::MSCRATCH, 0),    // x9 = 14 (pure read)
        addi(11, 0, 2),
        csrrc(10, csr::MSCRATCH, 11),  // x10 = 14, mscratch = 12
        addi(13, 0, 0x55),
        csrrw(12, csr::MSCRATCH, 13),  // x12 = 12, mscratch = 0x55
    ];
    let (board, retired) = run(&program, 9);
    let core = board.core();
    assert_eq!(21, core.x(x(8)));
    assert_eq!(14, core.x(x(9)));
    assert_eq!(14, core.x(x(10)));
    assert_eq!(12, core.x(x(12)));
    assert_eq!(Some(0x55), core.csr(csr::MSCRATCH));
    // The trace records the CSR touched by a read-modify-write.
    let access = &retired[2].csr[0];
    assert_eq!(csr::MSCRATCH, access.specifier);
    assert_eq!(u32::MAX, access.rmask);
    assert_eq!(u32::MAX, access.wmask);
    assert_eq!(9, access.rdata);
    assert_eq!(15, access.wdata);
}

#[test]
fn read_only_zero_csrs() {
    let program = [
        csrrs(1, csr::MVENDORID, 0), // read-only space, pure read: legal
        csrrs(2, csr::MISA, 0),
        addi(3, 0, 5),
        csrrw(0, csr::MTVAL, 3), // write silently dropped
        csrrs(4, csr::MTVAL, 0),
    ];
    let (board, _) = run(&program, 5);
    let core = board.core();
    assert_eq!(0, core.x(x(1)));
    assert_eq!(0, core.x(x(2)));
    assert_eq!(0, core.x(x(4)));
}

#[test]
fn illegal_csr_accesses_trap() {
    // Writing a read-only-space CSR.
    let (board, retired) = run(&[addi(1, 0, 1), csrrw(0, csr::MVENDORID, 1)], 2);
    assert!(retired[1].trap);
    assert_eq!(Some(2), board.core().csr(csr::MCAUSE));
    assert_eq!(Some(4), board.core().csr(csr::MEPC));
    // Accessing an unimplemented CSR number.
    let (board, retired) = run(&[csrrs(1, 0x306, 0)], 1);
    assert!(retired[0].trap);
    assert_eq!(Some(2), board.core().csr(csr::MCAUSE));
    // The RV32 upper counter halves (mcycleh) are unimplemented too, and
    // sit outside the read-only quadrant; even a pure read must trap, not
    // return zero.
    let (board, retired) = run(&[csrrs(1, 0xB80, 0)], 1);
    assert!(retired[0].trap);
    assert_eq!(Some(2), board.core().csr(csr::MCAUSE));
    assert_eq!(0, board.core().x(x(1)));
}

#[test]
fn jump_to_misaligned_target_traps() {
    let (board, retired) = run(&[jal(0, 6)], 1);
    assert!(retired[0].trap);
    assert_eq!(Some(0), board.core().csr(csr::MCAUSE));
    assert_eq!(Some(0), board.core().csr(csr::MEPC));
}

/// Wraps the RAM to record every bus request the core makes.
struct SpyBus {
    ram: Ram,
    requests: Vec<MasterSignals>,
}

impl SpyBus {
    fn new() -> Self {
        Self {
            ram: Ram::new(64 * 1024),
            requests: Vec::new(),
        }
    }
}

impl Bus for SpyBus {
    fn cycle(&mut self, m: &MasterSignals) -> SlaveSignals {
        let response = self.ram.cycle(m);
        if m.active() && response.ack {
            self.requests.push(*m);
        }
        response
    }
}

#[test]
fn misaligned_store_raises_without_a_bus_cycle() {
    let mut spy = SpyBus::new();
    let program = [addi(1, 0, 1), sh(1, 0, 0x41)];
    for (i, word) in program.iter().enumerate() {
        spy.ram.load(4 * i as u32, &word.to_le_bytes());
    }
    let mut core = Core::new(spy, Config::default()).unwrap();
    let mut retired = Vec::new();
    for _ in 0..200 {
        retired.extend(core.tick(false));
        if retired.len() == 2 {
            break;
        }
    }
    assert_eq!(2, retired.len());
    assert!(retired[1].trap);
    assert_eq!(Some(6), core.csr(csr::MCAUSE));
    assert_eq!(Some(4), core.csr(csr::MEPC));
    // Every acknowledged request was an instruction fetch; the store never
    // touched the bus.
    assert!(core.bus().requests.iter().all(|m| !m.we));
}

#[test]
fn misaligned_load_raises_without_a_bus_cycle() {
    let mut spy = SpyBus::new();
    // lw from 0x42: word-misaligned.
    let program = [lw(2, 0, 0x42)];
    for (i, word) in program.iter().enumerate() {
        spy.ram.load(4 * i as u32, &word.to_le_bytes());
    }
    let mut core = Core::new(spy, Config::default()).unwrap();
    let mut retired = Vec::new();
    for _ in 0..200 {
        retired.extend(core.tick(false));
        if !retired.is_empty() {
            break;
        }
    }
    assert!(retired[0].trap);
    assert_eq!(Some(4), core.csr(csr::MCAUSE));
    // No request ever addressed the data word at 0x40.
    assert!(core.bus().requests.iter().all(|m| m.adr != 0x40 >> 2));
}

#[test]
fn reset_state_and_first_fetch() {
    let mut board = board_with(&[addi(1, 0, 1)]);
    let core = board.core();
    assert_eq!(0, core.pc());
    assert_eq!(0, core.x(x(0)));
    assert_eq!(Some(0), core.csr(csr::MCAUSE));
    assert_eq!(Some(0x1800), core.csr(csr::MSTATUS));
    assert_eq!(Some(0), core.csr(csr::MIE));
    // The first instruction fetch begins within five ticks of reset.
    let mut fetched = false;
    for _ in 0..5 {
        board.tick();
        if board.core().upc() == 0 {
            fetched = true;
            break;
        }
    }
    assert!(fetched);
}

#[test]
fn retirement_trace_is_deterministic() {
    let program = [
        addi(1, 0, 17),
        sw(1, 0, 0x80),
        lw(2, 0, 0x80),
        sub(3, 2, 1),
        beq(3, 0, 8),
        addi(4, 0, 1),
        xor(5, 1, 2),
        srai(6, 1, 3),
    ];
    let (_, first) = run(&program, 7);
    let (_, second) = run(&program, 7);
    assert_eq!(first, second);
}

#[test]
fn wait_state_memory_preserves_semantics() {
    let program = [
        addi(1, 0, 5),
        addi(2, 1, -3),
        sw(2, 0, 0x40),
        lw(3, 0, 0x40),
    ];
    let mut board = Board::with_ram(Ram::new(64 * 1024).with_wait_states(3)).unwrap();
    board.load_words(0, &program);
    let retired = board.run_retirements(4, MAX_TICKS);
    assert_eq!(4, retired.len());
    assert_eq!(5, board.core().x(x(1)));
    assert_eq!(2, board.core().x(x(2)));
    assert_eq!(2, board.core().x(x(3)));
    // Same architectural outcome as the zero-wait-state run.
    let (fast, _) = run(&program, 4);
    for i in 1..=3 {
        assert_eq!(fast.core().x(x(i)), board.core().x(x(i)));
    }
}

#[test]
fn fence_is_a_legal_no_op() {
    let fence = 0x0FF0_000F;
    let (board, retired) = run(&[addi(1, 0, 3), fence, addi(2, 1, 1)], 3);
    assert!(!retired[1].trap);
    assert_eq!(4, board.core().x(x(2)));
    assert_eq!(0x0C, board.core().pc());
}
