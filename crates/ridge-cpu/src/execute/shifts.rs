//! Shifts, rotate, and sign-extend (spec.md §4.5.1, §4.5.3).
//!
//! Register forms take their count from `R[Ry]` masked to the field
//! width (5 bits for single-word shifts, 6 bits for the double-word
//! `DLSL`/`DLSR`); immediate forms take the count directly from the
//! 4-bit `ry` instruction field (0..15), which is always in range for
//! either mask.

use ridge_core::ExternalBus;

use crate::cpu::Processor;
use crate::decode::{Instruction, ShiftKind};
use crate::events::Event;

impl<B: ExternalBus> Processor<B> {
    pub(crate) fn exec_shift(&mut self, instr: &Instruction, kind: ShiftKind, immediate: bool) -> Option<Event> {
        let rx = instr.rx as usize;
        let count = if immediate {
            u32::from(instr.ry)
        } else {
            let mask = if matches!(kind, ShiftKind::Dlsl | ShiftKind::Dlsr) {
                0x3F
            } else {
                0x1F
            };
            self.registers.r[instr.ry as usize] & mask
        };

        match kind {
            ShiftKind::Lsl => self.registers.r[rx] = self.registers.r[rx] << count,
            ShiftKind::Lsr => self.registers.r[rx] >>= count,
            ShiftKind::Asr => self.registers.r[rx] = ((self.registers.r[rx] as i32) >> count) as u32,
            ShiftKind::Csl => self.registers.r[rx] = self.registers.r[rx].rotate_left(count),
            ShiftKind::Dlsl => {
                let pair = self.registers.pair(rx) << count;
                self.registers.set_pair(rx, pair);
            }
            ShiftKind::Dlsr => {
                let pair = self.registers.pair(rx) >> count;
                self.registers.set_pair(rx, pair);
            }
            ShiftKind::Asl => return self.exec_asl(rx, count),
        }
        None
    }

    /// ASL shifts one bit at a time, restoring the saved sign bit after
    /// each step; the first step whose pre-restore top bit differs from
    /// the saved sign raises `ArithmeticTrap`, and the shift stops there
    /// (spec.md §4.5.3, "Follow the 1983 edition"; §8 boundary behavior).
    fn exec_asl(&mut self, rx: usize, count: u32) -> Option<Event> {
        let sign = self.registers.r[rx] & 0x8000_0000;
        let mut value = self.registers.r[rx];
        let mut trapped = false;

        for _ in 0..count {
            let shifted = value << 1;
            let pre_restore_top = shifted & 0x8000_0000;
            value = (shifted & 0x7FFF_FFFF) | sign;
            if pre_restore_top != sign {
                trapped = true;
                break;
            }
        }

        self.registers.r[rx] = value;
        if trapped {
            Some(Event::ArithmeticTrap)
        } else {
            None
        }
    }

    pub(crate) fn exec_sign_extend(&mut self, instr: &Instruction) -> Option<Event> {
        use crate::decode::Opcode;

        let rx = instr.rx as usize;
        let ry = instr.ry as usize;
        match instr.op {
            Opcode::Seb => self.registers.r[rx] = i32::from(self.registers.r[ry] as u8 as i8) as u32,
            Opcode::Seh => self.registers.r[rx] = i32::from(self.registers.r[ry] as u16 as i16) as u32,
            _ => unreachable!("exec_sign_extend dispatched for non sign-extend opcode"),
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::tests::NullBus;
    use crate::decode::Opcode;

    fn instr(op: Opcode, rx: u8, ry: u8) -> Instruction {
        Instruction {
            op,
            opcode_byte: 0,
            rx,
            ry,
            displacement: 0,
            branch_address: 0,
            length: 2,
        }
    }

    #[test]
    fn lsl_shifts_left() {
        let mut cpu = Processor::new(0x1000, NullBus);
        cpu.registers.r[0] = 1;
        cpu.registers.r[1] = 4;
        cpu.exec_shift(&instr(Opcode::Shift(crate::decode::ShiftKind::Lsl, false), 0, 1), crate::decode::ShiftKind::Lsl, false);
        assert_eq!(cpu.registers.r[0], 16);
    }

    #[test]
    fn asl_traps_on_sign_change() {
        let mut cpu = Processor::new(0x1000, NullBus);
        cpu.registers.r[0] = 0x4000_0000;
        let event = cpu.exec_shift(&instr(Opcode::Shift(crate::decode::ShiftKind::Asl, true), 0, 2), crate::decode::ShiftKind::Asl, true);
        assert_eq!(event, Some(Event::ArithmeticTrap));
        assert_eq!(cpu.registers.r[0], 0);
    }

    #[test]
    fn seb_sign_extends_negative_byte() {
        let mut cpu = Processor::new(0x1000, NullBus);
        cpu.registers.r[1] = 0xFF;
        cpu.exec_sign_extend(&instr(Opcode::Seb, 0, 1));
        assert_eq!(cpu.registers.r[0], 0xFFFF_FFFF);
    }
}
