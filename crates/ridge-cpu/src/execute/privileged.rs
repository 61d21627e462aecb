//! Privileged opcodes: context switch, translation probe, SR transfer,
//! and the programmed-I/O bus (spec.md §4.5.1, §4.5.3).

use ridge_core::{CoreError, Device, ExternalBus};

use crate::cpu::Processor;
use crate::decode::Instruction;
use crate::events::Event;
use crate::layout;

impl<B: ExternalBus> Processor<B> {
    pub(crate) fn exec_privileged(&mut self, instr: &Instruction, opc: u32) -> Result<Option<Event>, CoreError> {
        use crate::decode::Opcode;

        match instr.op {
            Opcode::Maint | Opcode::Read | Opcode::Write => {
                if let Some(violation) = self.require_privileged(instr.opcode_byte) {
                    return Ok(Some(violation));
                }
            }
            _ => {
                if let Some(violation) = self.require_kernel(instr.opcode_byte) {
                    return Ok(Some(violation));
                }
            }
        }

        let event = match instr.op {
            Opcode::Sus => {
                self.exec_sus(instr);
                None
            }
            Opcode::Lus => {
                self.exec_lus(instr);
                None
            }
            Opcode::Ldregs => {
                self.exec_ldregs(instr);
                None
            }
            Opcode::Rum => self.exec_rum(instr.opcode_byte),
            Opcode::Trans => self.exec_trans_dirt(instr, false)?,
            Opcode::Dirt => self.exec_trans_dirt(instr, true)?,
            Opcode::MoveSr => {
                self.registers.sr[instr.rx as usize] = self.registers.r[instr.ry as usize];
                None
            }
            Opcode::MoveRs => {
                self.registers.r[instr.rx as usize] = self.registers.sr[instr.ry as usize];
                None
            }
            Opcode::Maint => self.exec_maint(instr, opc),
            Opcode::Read => self.exec_read(instr),
            Opcode::Write => self.exec_write(instr),
            _ => unreachable!("exec_privileged dispatched for non-privileged opcode"),
        };
        Ok(event)
    }

    /// `SUS Rx,Ry` (spec.md §4.5.3): save PC/segments/traps and the
    /// register window into the PCB at SR14, unless SR14 signals "no
    /// PCB".
    fn exec_sus(&mut self, instr: &Instruction) {
        if self.registers.sr[14] == layout::NO_PCB {
            return;
        }
        let base = self.registers.sr[14];
        self.memory.write_word(base + layout::pcb::SAVED_USER_PC, self.registers.sr[15]);
        self.memory.write_word(
            base + layout::pcb::SEGMENTS,
            (self.registers.sr[8] << 16) | (self.registers.sr[9] & 0xFFFF),
        );
        self.memory.write_word(base + layout::pcb::TRAPS_WORD, self.registers.sr[10]);
        for k in register_window(instr.rx, instr.ry) {
            self.memory
                .write_word(base + layout::pcb::register_offset(k), self.registers.r[k as usize]);
        }
    }

    /// `LUS`: the inverse of `SUS`.
    fn exec_lus(&mut self, instr: &Instruction) {
        if self.registers.sr[14] == layout::NO_PCB {
            return;
        }
        let base = self.registers.sr[14];
        self.registers.sr[15] = self.memory.read_word(base + layout::pcb::SAVED_USER_PC);
        let segments = self.memory.read_word(base + layout::pcb::SEGMENTS);
        self.registers.sr[8] = segments >> 16;
        self.registers.sr[9] = segments & 0xFFFF;
        self.registers.sr[10] = self.memory.read_word(base + layout::pcb::TRAPS_WORD);
        for k in register_window(instr.rx, instr.ry) {
            self.registers.r[k as usize] = self.memory.read_word(base + layout::pcb::register_offset(k));
        }
    }

    /// `LDREGS`: reloads just `R[Rx..Ry]` from the PCB, mirroring the
    /// register-window half of `LUS` without touching SR8/SR9/SR10/SR15.
    /// The source this was modelled on does not describe `LDREGS`
    /// further than naming it alongside `LUS`; this is the narrowest
    /// reading consistent with that naming.
    fn exec_ldregs(&mut self, instr: &Instruction) {
        if self.registers.sr[14] == layout::NO_PCB {
            return;
        }
        let base = self.registers.sr[14];
        for k in register_window(instr.rx, instr.ry) {
            self.registers.r[k as usize] = self.memory.read_word(base + layout::pcb::register_offset(k));
        }
    }

    /// `RUM`: with SR14==1 this is `KernelViolation` (spec.md §9, resolved
    /// open question), otherwise enter user mode at the saved PC.
    fn exec_rum(&mut self, opcode: u8) -> Option<Event> {
        if self.registers.sr[14] == layout::NO_PCB {
            return Some(Event::KernelViolation {
                d0: u32::from(opcode),
                d1: 0,
                d2: 0,
            });
        }
        self.registers.pc = self.registers.sr[15];
        self.registers.mode = crate::registers::ProcessorMode::User;
        None
    }

    /// `TRANS`/`DIRT Rx,Ry`: probe the VRT for `(R[Ry], R[(Ry+1) mod 16])`.
    fn exec_trans_dirt(&mut self, instr: &Instruction, modified: bool) -> Result<Option<Event>, CoreError> {
        let rx = instr.rx as usize;
        let ry = instr.ry as usize;
        let segment = self.registers.r[ry];
        let vaddr = self.registers.r[(ry + 1) & 0xF];
        let ctx = self.ctx();
        let result = self.memory.probe(segment, vaddr, modified, &ctx)?;
        self.registers.r[rx] = if result.page_fault { 0xFFFF_FFFF } else { result.value };
        Ok(None)
    }

    /// `READ`/`WRITE Rx,Ry` (spec.md §4.5.3): R[Ry] splits into device id
    /// (top byte, Ridge bit numbering) and device data (low 24 bits).
    /// `R[(Rx+1) mod 16]` is assigned before `R[Rx]`.
    fn exec_read(&mut self, instr: &Instruction) -> Option<Event> {
        let rx = instr.rx as usize;
        let ry = instr.ry as usize;
        let address_word = self.registers.r[ry];
        let device = (address_word >> 24) as u8;
        let device_data = address_word & 0x00FF_FFFF;

        let mut data = 0u32;
        let status = self.bus.read(device, device_data, &mut data);
        self.registers.r[(rx + 1) & 0xF] = data;
        self.registers.r[rx] = status;
        None
    }

    fn exec_write(&mut self, instr: &Instruction) -> Option<Event> {
        let rx = instr.rx as usize;
        let ry = instr.ry as usize;
        let address_word = self.registers.r[ry];
        let device = (address_word >> 24) as u8;
        let device_data = address_word & 0x00FF_FFFF;

        let status = self.bus.write(device, device_data, self.registers.r[rx]);
        self.registers.r[rx] = status;
        None
    }

    /// `MAINT Rx,Ry`: `Ry` selects the sub-operation (spec.md §4.5.3).
    fn exec_maint(&mut self, instr: &Instruction, opc: u32) -> Option<Event> {
        let rx = instr.rx as usize;
        match instr.ry {
            0 => {
                // ELOGR
                self.registers.r[rx] = if self.pending_device.is_some() { 0x10 } else { 0x00 };
                None
            }
            6 => None, // FLUSH: no caches modelled.
            7 => {
                // TRAPEXIT
                self.registers.pc = self.registers.sr[0];
                None
            }
            8 => {
                // ITEST
                if let Some(mut device) = self.pending_device.take() {
                    self.registers.r[(rx + 1) & 0xF] = device.ack_interrupt();
                    self.registers.r[rx] = 0;
                } else {
                    self.registers.r[rx] = 1;
                }
                None
            }
            10 => {
                // MACHINEID
                self.registers.r[rx] = 0x0001_00F0;
                None
            }
            _ => {
                let _ = opc;
                Some(self.illegal_instruction_event(instr))
            }
        }
    }
}

/// `SUS`/`LUS`/`LDREGS` register window: `Rx..=min(Ry,15)`, or just `Rx`
/// alone when `Rx > Ry` (spec.md §4.5.3).
fn register_window(rx: u8, ry: u8) -> std::ops::RangeInclusive<u8> {
    if rx > ry {
        rx..=rx
    } else {
        rx..=ry.min(15)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::tests::NullBus;
    use crate::decode::Opcode;
    use crate::registers::ProcessorMode;

    fn instr(op: Opcode, rx: u8, ry: u8) -> Instruction {
        Instruction {
            op,
            opcode_byte: 0x58,
            rx,
            ry,
            displacement: 0,
            branch_address: 0,
            length: 2,
        }
    }

    #[test]
    fn sus_then_lus_round_trips_registers() {
        let mut cpu = Processor::new(0x10000, NullBus);
        cpu.registers.sr[14] = 0x2000;
        cpu.registers.sr[15] = 0x1234;
        cpu.registers.sr[8] = 7;
        cpu.registers.sr[9] = 9;
        cpu.registers.sr[10] = 0xABCD;
        for i in 2..=5 {
            cpu.registers.r[i] = (i as u32) * 0x1111;
        }

        cpu.exec_privileged(&instr(Opcode::Sus, 2, 5), 0).unwrap();

        cpu.registers.sr[15] = 0;
        cpu.registers.sr[8] = 0;
        cpu.registers.sr[9] = 0;
        cpu.registers.sr[10] = 0;
        for i in 2..=5 {
            cpu.registers.r[i] = 0;
        }

        cpu.exec_privileged(&instr(Opcode::Lus, 2, 5), 0).unwrap();

        assert_eq!(cpu.registers.sr[15], 0x1234);
        assert_eq!(cpu.registers.sr[8], 7);
        assert_eq!(cpu.registers.sr[9], 9);
        assert_eq!(cpu.registers.sr[10], 0xABCD);
        for i in 2..=5 {
            assert_eq!(cpu.registers.r[i], (i as u32) * 0x1111);
        }
    }

    #[test]
    fn sus_is_no_op_when_no_pcb() {
        let mut cpu = Processor::new(0x10000, NullBus);
        cpu.registers.sr[14] = 1;
        cpu.exec_privileged(&instr(Opcode::Sus, 0, 2), 0).unwrap();
    }

    #[test]
    fn rum_with_no_pcb_is_kernel_violation() {
        let mut cpu = Processor::new(0x10000, NullBus);
        cpu.registers.sr[14] = 1;
        let event = cpu.exec_privileged(&instr(Opcode::Rum, 0, 0), 0).unwrap();
        assert!(matches!(event, Some(Event::KernelViolation { .. })));
    }

    #[test]
    fn rum_enters_user_mode_at_saved_pc() {
        let mut cpu = Processor::new(0x10000, NullBus);
        cpu.registers.sr[14] = 0x2000;
        cpu.registers.sr[15] = 0x4000;
        cpu.exec_privileged(&instr(Opcode::Rum, 0, 0), 0).unwrap();
        assert_eq!(cpu.registers.pc, 0x4000);
        assert_eq!(cpu.registers.mode, ProcessorMode::User);
    }

    #[test]
    fn privileged_op_in_user_mode_without_pp_faults() {
        let mut cpu = Processor::new(0x10000, NullBus);
        cpu.registers.mode = ProcessorMode::User;
        let event = cpu.exec_privileged(&instr(Opcode::MoveSr, 0, 1), 0).unwrap();
        assert!(matches!(event, Some(Event::KernelViolation { .. })));
    }

    #[test]
    fn maint_machineid() {
        let mut cpu = Processor::new(0x10000, NullBus);
        cpu.exec_privileged(&instr(Opcode::Maint, 3, 10), 0).unwrap();
        assert_eq!(cpu.registers.r[3], 0x0001_00F0);
    }
}
