//! The microcoded core: datapath, control, and their per-tick wiring.

pub mod align;
pub mod alu;
pub mod control;
pub mod csr;
pub mod decode;
pub mod exception;
pub mod program;
pub mod ucode;

use log::{debug, trace, warn};

use crate::bus::{Bus, MasterSignals};
use crate::instruction::Insn;
use crate::registers::{RegFile, Specifier};
use crate::rvfi::{CsrAccess, Retirement};

use alu::Alu;
use control::{entry, Conditions};
use csr::{CsrAttr, CsrFile};
use decode::Decode;
use exception::{Cause, ExceptionRouter, Sources};
use ucode::{
    ASrc, BSrc, CsrOp, CsrSel, ExceptCtl, PcAction, RegRSel, RegWSel, UCodeError, UCodeRom,
};

/// Build-time configuration of a [`Core`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Address of the first instruction fetched after reset. The
    /// architectural default is zero.
    pub reset_vector: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self { reset_vector: 0 }
    }
}

/// A single-hart, in-order, multicycle RV32I_Zicsr machine-mode core.
///
/// Every call to [`tick`](Self::tick) advances exactly one clock: one
/// micro-instruction executes, the bus exchanges one set of signals, and
/// at most one architectural instruction retires. The core owns its bus
/// slave `B`; the IRQ line is sampled per tick through the `irq` argument.
#[derive(Debug)]
pub struct Core<B: Bus> {
    config: Config,
    bus: B,
    ucode: UCodeRom,
    upc: u8,
    pc: u32,
    regs: RegFile,
    csrs: CsrFile,
    alu: Alu,
    decode: Decode,
    router: ExceptionRouter,
    /// Byte address register for data accesses, fed from the ALU output.
    data_adr: u32,
    /// Write data register; drives the bus `DAT_W` lines directly.
    write_data: u32,
    /// Gates CYC/STB for the first tick after reset, so a stale microword
    /// cannot start a spurious transaction.
    mem_reset_guard: bool,
    order: u64,
    record: Option<Retirement>,
    intr_pending: bool,
}

impl<B: Bus> Core<B> {
    /// Builds a core around `bus`, assembling and validating the microcode
    /// image, and leaves it in reset state.
    pub fn new(bus: B, config: Config) -> Result<Self, UCodeError> {
        let ucode = program::rom()?;
        let mut core = Self {
            config,
            bus,
            ucode,
            upc: entry::RESET,
            pc: 0,
            regs: RegFile::new(),
            csrs: CsrFile::new(),
            alu: Alu::new(),
            decode: Decode::new(),
            router: ExceptionRouter::new(),
            data_adr: 0,
            write_data: 0,
            mem_reset_guard: true,
            order: 0,
            record: None,
            intr_pending: false,
        };
        core.reset();
        Ok(core)
    }

    /// Applies a synchronous reset.
    ///
    /// The micro-PC returns to the reset preamble, which spends its first
    /// two ticks forcing x0 and MCAUSE to zero before the first fetch;
    /// general registers otherwise keep their contents, as a hardware
    /// register file would.
    pub fn reset(&mut self) {
        self.upc = entry::RESET;
        self.pc = self.config.reset_vector & !0b11;
        self.csrs.reset();
        self.alu.reset();
        self.decode.reset();
        self.router.reset();
        self.data_adr = 0;
        self.write_data = 0;
        self.mem_reset_guard = true;
        self.order = 0;
        self.record = None;
        self.intr_pending = false;
    }

    /// Advances one clock tick with the IRQ line at `irq`.
    ///
    /// Returns the retirement record completed on this tick, if any.
    pub fn tick(&mut self, irq: bool) -> Option<Retirement> {
        // MIP.MEIP mirrors the IRQ line; reads and the exception router
        // must agree on its value for the whole tick.
        self.csrs.set_irq(irq);
        let uw = *self.ucode.word(self.upc);

        // Bus request and response for this tick. The slave may answer
        // combinationally, so its signals are valid from here on.
        let master = if uw.mem_req && !self.mem_reset_guard {
            if uw.insn_fetch {
                MasterSignals {
                    cyc: true,
                    stb: true,
                    we: false,
                    adr: self.pc >> 2,
                    sel: 0b1111,
                    dat_w: 0,
                }
            } else {
                MasterSignals {
                    cyc: true,
                    stb: true,
                    we: uw.write_mem,
                    adr: self.data_adr >> 2,
                    sel: align::byte_select(uw.mem_sel, self.data_adr),
                    dat_w: self.write_data,
                }
            }
        } else {
            MasterSignals::IDLE
        };
        let slave = self.bus.cycle(&master);
        let ack = master.active() && slave.ack;
        let do_decode = uw.insn_fetch && ack;

        // Exception routing, valid this tick.
        let sources = Sources {
            decode: self.decode.exception(),
            irq_pending: self.csrs.mstatus().mie() && self.csrs.meip() && self.csrs.meie(),
            alu_out: self.alu.output(),
            mem_sel: uw.mem_sel,
        };
        let detected = self.router.check(uw.except_ctl, &sources);

        // Condition mux and sequencer.
        let conditions = Conditions {
            exception: detected.is_some(),
            alu_zero: self.alu.zero(),
            alu_low5_zero: self.alu.low5_zero(),
            mem_valid: ack,
        };
        let taken = control::test(uw.cond_test, uw.invert_test, &conditions);
        let next_upc = control::next_upc(
            uw.jmp_type,
            taken,
            self.upc,
            uw.target,
            self.decode.requested_op(),
        );

        // Retirement bookkeeping: a new fetch completes the previous
        // instruction's record.
        let mut retirement = None;
        if do_decode {
            retirement = self.seal_record();
            self.open_record(slave.dat_r);
        }
        if let Some(cause) = detected {
            if cause == Cause::MachineExternal {
                // The preempted instruction never ran; it leaves no trace.
                debug!("external interrupt taken at pc {:#010x}", self.pc);
                self.record = None;
            } else {
                trace!("exception {cause:?} at pc {:#010x}", self.pc);
                if let Some(record) = &mut self.record {
                    record.trap = true;
                }
            }
            self.intr_pending = true;
        }

        // Commit phase. Everything below reads the state as it stood at
        // the start of the tick and writes the state for the next one.
        let alu_out = self.alu.output();
        let port = self.regs.port();
        let csr_port = self.csrs.port();
        let pc = self.pc;
        let data_adr = self.data_adr;

        if do_decode {
            self.decode.decode(slave.dat_r);
        } else {
            self.decode.step();
        }

        // Register file: write first so a same-tick read is transparent.
        if uw.reg_write {
            match uw.reg_w_sel {
                RegWSel::InsnRd => {
                    let rd = self.decode.rd();
                    self.regs.write(rd, alu_out);
                    if let Some(record) = &mut self.record {
                        record.rd_addr = rd.index();
                        record.rd_wdata = self.regs.x(rd);
                    }
                }
                RegWSel::Zero => self.regs.write_zero_slot(alu_out),
            }
        }
        if uw.reg_read {
            let specifier = match uw.reg_r_sel {
                // The eager read: on the fetch ACK tick the address comes
                // straight from the incoming instruction word.
                RegRSel::InsnRs1 if do_decode => Insn(slave.dat_r).rs1(),
                RegRSel::InsnRs1 => self.decode.rs1(),
                RegRSel::InsnRs2 => self.decode.rs2(),
            };
            self.regs.read(specifier);
        }

        // CSR file.
        match uw.csr_op {
            CsrOp::None => {}
            CsrOp::Read => {
                let index = self.csr_index(&uw);
                self.csrs.read(index);
                if uw.csr_sel == CsrSel::Insn {
                    let value = self.csrs.port();
                    self.record_csr(|access| {
                        access.rmask = u32::MAX;
                        access.rdata = value;
                    });
                }
            }
            CsrOp::Write => {
                let index = self.csr_index(&uw);
                self.csrs.write(index, alu_out);
                if uw.csr_sel == CsrSel::Insn {
                    self.record_csr(|access| {
                        access.wmask = u32::MAX;
                        access.wdata = alu_out;
                    });
                }
            }
        }
        match uw.except_ctl {
            ExceptCtl::EnterTrap => {
                self.csrs.enter_trap();
                debug!("trap entry, mcause {:#010x}", self.router.mcause());
            }
            ExceptCtl::LeaveTrap => self.csrs.leave_trap(),
            _ => {}
        }

        // ALU: compute over the current latches, then refresh them.
        let latch_a = uw.latch_a.then(|| match uw.a_src {
            ASrc::Gp => port,
            ASrc::Imm => self.decode.imm(),
            ASrc::AluO => alu_out,
            ASrc::Zero => 0,
            ASrc::Four => 4,
            ASrc::ThirtyOne => 31,
        });
        let latch_b = uw.latch_b.then(|| match uw.b_src {
            BSrc::Gp => port,
            BSrc::Pc => pc,
            BSrc::Imm => self.decode.imm(),
            BSrc::One => 1,
            BSrc::DatR => align::read_data(uw.mem_sel, uw.mem_extend, data_adr, slave.dat_r),
            BSrc::CsrImm => self.decode.csr_uimm(),
            BSrc::Csr => csr_port,
            BSrc::McauseLatch => self.router.mcause(),
        });
        self.alu.step(uw.alu_op, uw.alu_i_mod, uw.alu_o_mod, latch_a, latch_b);

        // Program counter; loads discard the low bits.
        match uw.pc_action {
            PcAction::Hold => {}
            PcAction::Inc => self.pc = pc.wrapping_add(4),
            PcAction::LoadAluO => self.pc = alu_out & !0b11,
        }

        // Bus-side latches.
        if uw.latch_adr {
            self.data_adr = alu_out;
        }
        if uw.latch_data {
            self.write_data = align::write_data(uw.mem_sel, data_adr, alu_out);
        }

        // Trace a completed data access.
        if ack && !uw.insn_fetch {
            if let Some(record) = &mut self.record {
                record.mem_addr = data_adr;
                if uw.write_mem {
                    record.mem_wmask = master.sel;
                    record.mem_wdata = master.dat_w;
                } else {
                    record.mem_rmask = master.sel;
                    record.mem_rdata = slave.dat_r;
                }
            }
        }

        self.router.commit(detected);
        self.mem_reset_guard = false;
        if next_upc == entry::PANIC && self.upc != entry::PANIC {
            warn!("micro-pc entered the panic slot (from {:#04x})", self.upc);
        }
        self.upc = next_upc;
        retirement
    }

    fn csr_index(&self, uw: &ucode::MicroWord) -> u8 {
        match uw.csr_sel {
            CsrSel::Insn => self.decode.csr_index(),
            CsrSel::Target => uw.target & 0xF,
        }
    }

    fn open_record(&mut self, raw: u32) {
        let insn = Insn(raw);
        self.record = Some(Retirement {
            insn: raw,
            mode: 3,
            ixl: 1,
            intr: std::mem::take(&mut self.intr_pending),
            rs1_addr: insn.rs1().index(),
            rs1_rdata: self.regs.x(insn.rs1()),
            rs2_addr: insn.rs2().index(),
            rs2_rdata: self.regs.x(insn.rs2()),
            pc_rdata: self.pc,
            ..Retirement::default()
        });
    }

    fn seal_record(&mut self) -> Option<Retirement> {
        let mut record = self.record.take()?;
        record.order = self.order;
        self.order += 1;
        record.pc_wdata = self.pc;
        Some(record)
    }

    fn record_csr(&mut self, update: impl FnOnce(&mut CsrAccess)) {
        let specifier = self.decode.insn().csr();
        if let Some(record) = &mut self.record {
            let index = match record
                .csr
                .iter()
                .position(|access| access.specifier == specifier)
            {
                Some(index) => index,
                None => {
                    record.csr.push(CsrAccess {
                        specifier,
                        ..CsrAccess::default()
                    });
                    record.csr.len() - 1
                }
            };
            update(&mut record.csr[index]);
        }
    }

    /// Provides a read-only view of this core's configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The current program counter.
    pub fn pc(&self) -> u32 {
        self.pc
    }

    /// The current micro-program counter.
    pub fn upc(&self) -> u8 {
        self.upc
    }

    /// `true` once the micro-program has parked itself on the halt or
    /// panic slot.
    pub fn halted(&self) -> bool {
        self.upc == entry::HALT || self.upc == entry::PANIC
    }

    /// The architectural value of an `x` register.
    pub fn x(&self, specifier: Specifier) -> u32 {
        self.regs.x(specifier)
    }

    /// The architectural value of a CSR by its 12-bit specifier.
    ///
    /// Read-only-zero CSRs return zero; unimplemented ones return `None`.
    pub fn csr(&self, specifier: csr::CsrSpecifier) -> Option<u32> {
        match csr::attributes(specifier) {
            CsrAttr::Implemented => Some(self.csrs.value(csr::file_index(specifier))),
            CsrAttr::ReadOnlyZero => Some(0),
            CsrAttr::Illegal => None,
        }
    }

    /// Access to the bus slave this core drives.
    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }
}
