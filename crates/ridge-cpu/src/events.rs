//! Event dispatch (spec.md §4.6): the per-event special-register writes
//! and the CCB vector fetch.
//!
//! Events never become host-language exceptions (spec.md §9, "Events vs.
//! exceptions") — a handler in `execute` returns an `Event` value, `step`
//! observes it and calls `EventDispatcher::signal`, which mutates SR/PC
//! directly and resumes. Architectural events are always local; they
//! never bubble out of `step` the way a [`ridge_core::CoreError`] does.

use crate::layout;
use crate::memory::MemoryController;
use crate::registers::{ProcessorMode, Registers};

/// The closed set of architectural events (spec.md §4.6 table, plus
/// `TrapInstruction` from §4.5.3 — see the dispatcher's offset constant).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Kcall { event_number: u8 },
    DataAlignment,
    IllegalInstruction { opcode: u8, segment: u32 },
    PageFault { segment: u32, address: u32 },
    KernelViolation { d0: u32, d1: u32, d2: u32 },
    ArithmeticTrap,
    TrapInstruction,
    ExternalInterrupt { ack: u32 },
    Switch0Interrupt,
    Timer1Interrupt,
    Timer2Interrupt,
}

/// `TRAP`'s event is not in spec.md §4.6's table, only named in §4.5.3.
/// It is given the next free CCB slot after `IllegalInstruction`
/// (0x404) and before `PageFault` (0x410), following the same
/// "SR0←opc in kernel, SR0←1/SR15←opc in user" pattern as the other
/// simple traps in the table.
const TRAP_INSTRUCTION_OFFSET: u32 = 0x408;

#[derive(Debug, Default, Clone, Copy)]
pub struct EventDispatcher;

impl EventDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Apply `event`'s SR writes (keyed by the processor's mode *before*
    /// entry) and, if `doVector`, switch to kernel mode and fetch the CCB
    /// vector. `opc` is the saved start-of-instruction PC.
    pub fn signal(&self, event: Event, opc: u32, regs: &mut Registers, memory: &MemoryController) {
        let entry_mode = regs.mode;

        let (offset, do_vector) = match event {
            Event::Kcall { event_number } => {
                if entry_mode == ProcessorMode::User {
                    regs.sr[15] = regs.pc;
                }
                (layout::ccb::kcall_offset(event_number), true)
            }
            Event::DataAlignment => {
                self.write_simple_trap(entry_mode, opc, regs);
                (layout::ccb::DATA_ALIGNMENT, true)
            }
            Event::IllegalInstruction { opcode, segment } => {
                match entry_mode {
                    ProcessorMode::Kernel => {
                        regs.sr[0] = opc;
                        regs.sr[3] = opc;
                    }
                    ProcessorMode::User => {
                        regs.sr[0] = 1;
                        regs.sr[15] = opc;
                        regs.sr[3] = opc;
                    }
                }
                regs.sr[1] = u32::from(opcode);
                regs.sr[2] = segment;
                (layout::ccb::ILLEGAL_INSTRUCTION, true)
            }
            Event::PageFault { segment, address } => {
                regs.sr[0] = 1;
                regs.sr[1] = 0xFFFF_FFFF;
                regs.sr[2] = segment;
                regs.sr[3] = address;
                regs.sr[15] = opc;
                (layout::ccb::PAGE_FAULT, true)
            }
            Event::KernelViolation { d0, d1, d2 } => {
                match entry_mode {
                    ProcessorMode::Kernel => regs.sr[0] = opc,
                    ProcessorMode::User => {
                        regs.sr[0] = 1;
                        regs.sr[15] = opc;
                    }
                }
                regs.sr[1] = d0;
                regs.sr[2] = d1;
                regs.sr[3] = d2;
                (layout::ccb::KERNEL_VIOLATION, true)
            }
            Event::ArithmeticTrap => (layout::ccb::ARITHMETIC_TRAP, true),
            Event::TrapInstruction => {
                self.write_simple_trap(entry_mode, opc, regs);
                (TRAP_INSTRUCTION_OFFSET, true)
            }
            Event::ExternalInterrupt { ack } => {
                if entry_mode == ProcessorMode::User {
                    regs.sr[0] = ack;
                    regs.sr[15] = opc;
                    (layout::ccb::EXTERNAL_INTERRUPT, true)
                } else {
                    (layout::ccb::EXTERNAL_INTERRUPT, false)
                }
            }
            Event::Switch0Interrupt => {
                self.write_simple_trap(entry_mode, opc, regs);
                (layout::ccb::SWITCH0_INTERRUPT, true)
            }
            Event::Timer1Interrupt => self.user_only_trap(entry_mode, opc, regs, layout::ccb::TIMER1_INTERRUPT),
            Event::Timer2Interrupt => self.user_only_trap(entry_mode, opc, regs, layout::ccb::TIMER2_INTERRUPT),
        };

        if do_vector {
            let vector = memory.read_word(regs.sr[11].wrapping_add(offset));
            regs.mode = ProcessorMode::Kernel;
            regs.pc = vector;
        }
    }

    /// The "SR0←opc in kernel, SR0←1 + SR15←opc in user" pattern shared by
    /// `DataAlignment`, `TrapInstruction`, and `Switch0Interrupt`.
    fn write_simple_trap(&self, entry_mode: ProcessorMode, opc: u32, regs: &mut Registers) {
        match entry_mode {
            ProcessorMode::Kernel => regs.sr[0] = opc,
            ProcessorMode::User => {
                regs.sr[0] = 1;
                regs.sr[15] = opc;
            }
        }
    }

    /// `Timer1Interrupt`/`Timer2Interrupt`: no effect at all in kernel mode
    /// (spec.md §4.5.4, "doVector flag is cleared and SR updates skipped").
    fn user_only_trap(
        &self,
        entry_mode: ProcessorMode,
        opc: u32,
        regs: &mut Registers,
        offset: u32,
    ) -> (u32, bool) {
        if entry_mode == ProcessorMode::User {
            regs.sr[0] = 1;
            regs.sr[15] = opc;
            (offset, true)
        } else {
            (offset, false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryController;

    fn dispatcher_setup() -> (EventDispatcher, Registers, MemoryController) {
        let mut regs = Registers::new();
        regs.sr[11] = 0x9000; // CCB base
        let mem = MemoryController::new(0x10000);
        (EventDispatcher::new(), regs, mem)
    }

    #[test]
    fn data_alignment_kernel_entry() {
        let (d, mut regs, mut mem) = dispatcher_setup();
        mem.write_word(0x9000 + layout::ccb::DATA_ALIGNMENT, 0x2000);
        regs.mode = ProcessorMode::Kernel;
        d.signal(Event::DataAlignment, 0x1234, &mut regs, &mem);
        assert_eq!(regs.sr[0], 0x1234);
        assert_eq!(regs.mode, ProcessorMode::Kernel);
        assert_eq!(regs.pc, 0x2000);
    }

    #[test]
    fn data_alignment_user_entry_sets_sentinel_and_saves_pc() {
        let (d, mut regs, mut mem) = dispatcher_setup();
        mem.write_word(0x9000 + layout::ccb::DATA_ALIGNMENT, 0x2000);
        regs.mode = ProcessorMode::User;
        d.signal(Event::DataAlignment, 0x1234, &mut regs, &mem);
        assert_eq!(regs.sr[0], 1);
        assert_eq!(regs.sr[15], 0x1234);
        assert_eq!(regs.mode, ProcessorMode::Kernel);
        assert_eq!(regs.pc, 0x2000);
    }

    #[test]
    fn page_fault_is_mode_independent() {
        let (d, mut regs, mut mem) = dispatcher_setup();
        mem.write_word(0x9000 + layout::ccb::PAGE_FAULT, 0x3000);
        regs.mode = ProcessorMode::User;
        d.signal(
            Event::PageFault {
                segment: 5,
                address: 0x800,
            },
            0x1000,
            &mut regs,
            &mem,
        );
        assert_eq!(regs.sr[0], 1);
        assert_eq!(regs.sr[1], 0xFFFF_FFFF);
        assert_eq!(regs.sr[2], 5);
        assert_eq!(regs.sr[3], 0x800);
        assert_eq!(regs.sr[15], 0x1000);
        assert_eq!(regs.mode, ProcessorMode::Kernel);
        assert_eq!(regs.pc, 0x3000);
    }

    #[test]
    fn timer_interrupt_has_no_effect_in_kernel_mode() {
        let (d, mut regs, mut mem) = dispatcher_setup();
        mem.write_word(0x9000 + layout::ccb::TIMER1_INTERRUPT, 0x4000);
        regs.mode = ProcessorMode::Kernel;
        regs.pc = 0x1234;
        d.signal(Event::Timer1Interrupt, 0x1000, &mut regs, &mem);
        assert_eq!(regs.mode, ProcessorMode::Kernel);
        assert_eq!(regs.pc, 0x1234);
        assert_eq!(regs.sr[0], 0);
    }

    #[test]
    fn timer_interrupt_vectors_in_user_mode() {
        let (d, mut regs, mut mem) = dispatcher_setup();
        mem.write_word(0x9000 + layout::ccb::TIMER1_INTERRUPT, 0x4000);
        regs.mode = ProcessorMode::User;
        d.signal(Event::Timer1Interrupt, 0x1000, &mut regs, &mem);
        assert_eq!(regs.sr[0], 1);
        assert_eq!(regs.sr[15], 0x1000);
        assert_eq!(regs.mode, ProcessorMode::Kernel);
        assert_eq!(regs.pc, 0x4000);
    }

    #[test]
    fn kernel_violation_carries_d0_d1_d2() {
        let (d, mut regs, mut mem) = dispatcher_setup();
        mem.write_word(0x9000 + layout::ccb::KERNEL_VIOLATION, 0x5000);
        regs.mode = ProcessorMode::Kernel;
        d.signal(
            Event::KernelViolation {
                d0: 0x60,
                d1: 0,
                d2: 0,
            },
            0x1000,
            &mut regs,
            &mem,
        );
        assert_eq!(regs.sr[0], 0x1000);
        assert_eq!(regs.sr[1], 0x60);
        assert_eq!(regs.pc, 0x5000);
    }
}
