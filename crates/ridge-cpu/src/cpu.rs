//! The Processor: register file owner and decode-dispatch-execute loop
//! (spec.md §4.5).

use ridge_core::{CoreError, Device, ExternalBus, Observable, Value};

use crate::decode::{Instruction, InstructionDecoder};
use crate::events::{Event, EventDispatcher};
use crate::layout;
use crate::memory::{MemoryController, Segment, TranslationContext};
use crate::registers::{ProcessorMode, Registers};

/// Owns the register file, the memory subsystem, and the device bus; runs
/// the `step` loop (spec.md §4.5.2).
pub struct Processor<B: ExternalBus> {
    pub registers: Registers,
    pub(crate) memory: MemoryController,
    decoder: InstructionDecoder,
    dispatcher: EventDispatcher,
    pub(crate) bus: B,
    pub(crate) pending_device: Option<B::Device>,
    timer_ticks: u32,
}

impl<B: ExternalBus> Processor<B> {
    #[must_use]
    pub fn new(memory_size_bytes: usize, bus: B) -> Self {
        let mut registers = Registers::new();
        registers.reset(memory_size_bytes as u32);
        Self {
            registers,
            memory: MemoryController::new(memory_size_bytes),
            decoder: InstructionDecoder::new(),
            dispatcher: EventDispatcher::new(),
            bus,
            pending_device: None,
            timer_ticks: 0,
        }
    }

    pub fn reset(&mut self) {
        let size = self.memory.size_bytes() as u32;
        self.registers.reset(size);
        self.pending_device = None;
        self.timer_ticks = 0;
    }

    #[must_use]
    pub fn memory(&self) -> &MemoryController {
        &self.memory
    }

    /// Mutable memory access for the host harness to seed an image before
    /// `step`ping — not for use while a step is in flight (spec.md §9,
    /// "Shared-resource discipline").
    pub fn memory_mut(&mut self) -> &mut MemoryController {
        &mut self.memory
    }

    pub(crate) fn ctx(&self) -> TranslationContext {
        TranslationContext {
            mode: self.registers.mode,
            code_segment: self.registers.sr[8],
            data_segment: self.registers.sr[9],
            vrt_base: self.registers.sr[12],
            vrt_mask: self.registers.sr[13],
        }
    }

    /// Execute one instruction (spec.md §4.5.2).
    pub fn step(&mut self) -> Result<(), CoreError> {
        let opc = self.registers.pc;

        let (instr, fetch_fault) = match self.registers.mode {
            ProcessorMode::Kernel => (self.decoder.decode_raw(&self.memory, opc), false),
            ProcessorMode::User => {
                let ctx = self.ctx();
                let (instr, fault) = self.decoder.decode(&mut self.memory, &ctx, opc)?;
                (instr, fault)
            }
        };

        if fetch_fault {
            let event = Event::PageFault {
                segment: self.registers.sr[8],
                address: opc,
            };
            self.dispatcher.signal(event, opc, &mut self.registers, &self.memory);
            return Ok(());
        }

        self.registers.pc = opc.wrapping_add(u32::from(instr.length));

        if let Some(event) = self.execute(&instr, opc)? {
            self.dispatcher.signal(event, opc, &mut self.registers, &self.memory);
        }

        self.poll_interrupt();
        self.tick_timers();

        Ok(())
    }

    fn poll_interrupt(&mut self) {
        if self.pending_device.is_none() {
            self.pending_device = self.bus.interrupt_requested();
        }
        if self.registers.mode == ProcessorMode::User {
            if let Some(mut device) = self.pending_device.take() {
                let ack = device.ack_interrupt();
                let opc = self.registers.pc;
                self.dispatcher
                    .signal(Event::ExternalInterrupt { ack }, opc, &mut self.registers, &self.memory);
            }
        }
    }

    fn tick_timers(&mut self) {
        if self.registers.sr[11] == layout::TIMERS_DISABLED_CCB {
            return;
        }

        self.timer_ticks = self.timer_ticks.wrapping_add(1);
        if self.timer_ticks < layout::TIMER_TICK_THRESHOLD {
            return;
        }
        self.timer_ticks = 0;

        let t1_addr = self.registers.sr[11].wrapping_add(layout::ccb::TIMER1_WORD);
        let t2_addr = self.registers.sr[11].wrapping_add(layout::ccb::TIMER2_WORD);

        let t1_before = self.memory.read_word(t1_addr) as i32;
        let t1_after = t1_before.wrapping_sub(1);
        self.memory.write_word(t1_addr, t1_after as u32);
        let t2_before = self.memory.read_word(t2_addr) as i32;
        let t2_after = t2_before.wrapping_sub(1);
        self.memory.write_word(t2_addr, t2_after as u32);

        let opc = self.registers.pc;
        if t1_before >= 0 && t1_after < 0 {
            self.dispatcher.signal(Event::Timer1Interrupt, opc, &mut self.registers, &self.memory);
        } else if t2_before >= 0 && t2_after < 0 {
            self.dispatcher.signal(Event::Timer2Interrupt, opc, &mut self.registers, &self.memory);
        }

        if self.registers.mode == ProcessorMode::User && self.registers.sr[14] != layout::NO_PCB {
            let clock_addr = self.registers.sr[14].wrapping_add(layout::pcb::PROCESS_CLOCK);
            let value = self.memory.read_word(clock_addr);
            self.memory.write_word(clock_addr, value.wrapping_add(1));
        }
    }

    /// The segment recorded into `SR2` for `IllegalInstruction` — always
    /// the current code segment, whether or not it was actually used for
    /// translation this step.
    pub(crate) fn illegal_instruction_event(&self, instr: &Instruction) -> Event {
        Event::IllegalInstruction {
            opcode: instr.opcode_byte,
            segment: self.registers.sr[8],
        }
    }

    /// `MAINT`/`READ`/`WRITE`: kernel mode or user mode with SR10 bit 31
    /// (PP) set (spec.md §4.5.1).
    pub(crate) fn require_privileged(&self, opcode: u8) -> Option<Event> {
        if self.registers.privileged_access() {
            None
        } else {
            Some(Event::KernelViolation {
                d0: u32::from(opcode),
                d1: 0,
                d2: 0,
            })
        }
    }

    /// `SUS`/`LUS`/`RUM`/`LDREGS`/`TRANS`/`DIRT`/`MOVE_sr`/`MOVE_rs`: strict
    /// kernel mode, no PP bypass (spec.md §4.5.1).
    pub(crate) fn require_kernel(&self, opcode: u8) -> Option<Event> {
        if self.registers.mode == ProcessorMode::Kernel {
            None
        } else {
            Some(Event::KernelViolation {
                d0: u32::from(opcode),
                d1: 0,
                d2: 0,
            })
        }
    }

    fn execute(&mut self, instr: &Instruction, opc: u32) -> Result<Option<Event>, CoreError> {
        use crate::decode::Opcode;

        let event = match instr.op {
            Opcode::Move
            | Opcode::Neg
            | Opcode::Not
            | Opcode::Add
            | Opcode::Sub
            | Opcode::Mpy
            | Opcode::Div
            | Opcode::Rem
            | Opcode::Or
            | Opcode::Xor
            | Opcode::And
            | Opcode::Cbit
            | Opcode::Sbit
            | Opcode::Tbit
            | Opcode::Chk => self.exec_alu(instr),

            Opcode::AddI | Opcode::MoveI | Opcode::SubI | Opcode::MpyI | Opcode::NotI | Opcode::AndI | Opcode::ChkI => {
                self.exec_alu_immediate(instr)
            }

            Opcode::Shift(kind, immediate) => self.exec_shift(instr, kind, immediate),
            Opcode::Seb | Opcode::Seh => self.exec_sign_extend(instr),

            Opcode::Lcomp | Opcode::Dcomp | Opcode::Eadd | Opcode::Esub | Opcode::Empy | Opcode::Ediv => {
                self.exec_extended(instr)
            }
            Opcode::FloatStub(_) => Some(self.illegal_instruction_event(instr)),

            Opcode::Sus
            | Opcode::Lus
            | Opcode::Rum
            | Opcode::Ldregs
            | Opcode::Trans
            | Opcode::Dirt
            | Opcode::MoveSr
            | Opcode::MoveRs
            | Opcode::Maint
            | Opcode::Read
            | Opcode::Write => self.exec_privileged(instr, opc)?,

            Opcode::Test(cond, immediate) => self.exec_test(instr, cond, immediate),

            Opcode::Callr => self.exec_callr(instr, opc),
            Opcode::Ret => self.exec_ret(instr),
            Opcode::Kcall => self.exec_kcall(instr),
            Opcode::Trap => self.exec_trap(instr),

            Opcode::Branch(cond, immediate) => self.exec_branch(instr, cond, immediate),
            Opcode::Loop => self.exec_loop(instr),
            Opcode::Call => self.exec_call(instr, opc),
            Opcode::Br => self.exec_br(instr),

            Opcode::Load(width, mode, indexed) => self.exec_load(instr, width, mode, indexed, opc)?,
            Opcode::Store(width, mode, indexed) => self.exec_store(instr, width, mode, indexed, opc)?,
            Opcode::Laddr(mode, indexed) => self.exec_laddr(instr, mode, indexed, opc),

            Opcode::Illegal => Some(self.illegal_instruction_event(instr)),
        };

        Ok(event)
    }
}

impl<B: ExternalBus> Observable for Processor<B> {
    fn query(&self, path: &str) -> Option<Value> {
        if let Some(rest) = path.strip_prefix("r.") {
            let i: usize = rest.parse().ok()?;
            return self.registers.r.get(i).copied().map(Value::from);
        }
        if let Some(rest) = path.strip_prefix("sr.") {
            let i: usize = rest.parse().ok()?;
            return self.registers.sr.get(i).copied().map(Value::from);
        }
        match path {
            "pc" => Some(Value::from(self.registers.pc)),
            "mode" => Some(Value::String(
                match self.registers.mode {
                    ProcessorMode::Kernel => "kernel",
                    ProcessorMode::User => "user",
                }
                .to_string(),
            )),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &["pc", "mode", "r.<0-15>", "sr.<0-15>"]
    }
}
