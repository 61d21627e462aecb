//! Integer ALU: register-register and immediate forms (spec.md §4.5.1,
//! §4.5.3).
//!
//! ADD/SUB/MPY/DIV overflow traps are marked TODO in the source this was
//! modelled on and are not implemented here either: arithmetic wraps
//! silently (spec.md §9, open question). Division and remainder by zero
//! are likewise undocumented; rather than let Rust's division panic, a
//! zero divisor is a no-op on the destination register.

use ridge_core::ExternalBus;

use crate::cpu::Processor;
use crate::decode::Instruction;
use crate::events::Event;

/// Sign-extend the 4-bit `ry` immediate field (spec.md §4.5.1, "4-bit
/// unsigned or sign-extended Ry"; resolved uniformly to sign-extended,
/// matching the explicit `NOTI_i` resolution in spec.md §9).
fn sign_extend_nibble(ry: u8) -> i32 {
    (i32::from(ry) << 28) >> 28
}

impl<B: ExternalBus> Processor<B> {
    pub(crate) fn exec_alu(&mut self, instr: &Instruction) -> Option<Event> {
        use crate::decode::Opcode;

        let rx = instr.rx as usize;
        let ry = instr.ry as usize;
        let r = &mut self.registers.r;

        match instr.op {
            Opcode::Move => r[rx] = r[ry],
            Opcode::Neg => r[rx] = (r[ry] as i32).wrapping_neg() as u32,
            Opcode::Not => r[rx] = !r[ry],
            Opcode::Add => r[rx] = r[rx].wrapping_add(r[ry]),
            Opcode::Sub => r[rx] = r[rx].wrapping_sub(r[ry]),
            Opcode::Mpy => r[rx] = (r[rx] as i32).wrapping_mul(r[ry] as i32) as u32,
            Opcode::Div => {
                if r[ry] != 0 {
                    r[rx] = (r[rx] as i32).wrapping_div(r[ry] as i32) as u32;
                }
            }
            Opcode::Rem => {
                if r[ry] != 0 {
                    r[rx] = (r[rx] as i32).wrapping_rem(r[ry] as i32) as u32;
                }
            }
            Opcode::Or => r[rx] |= r[ry],
            Opcode::Xor => r[rx] ^= r[ry],
            Opcode::And => r[rx] &= r[ry],
            Opcode::Cbit | Opcode::Sbit | Opcode::Tbit => {
                return self.exec_bit_op(instr);
            }
            Opcode::Chk => {
                if (r[rx] as i32) > (r[ry] as i32) {
                    return Some(Event::ArithmeticTrap);
                }
            }
            _ => unreachable!("exec_alu dispatched for non-ALU opcode"),
        }
        None
    }

    /// `CBIT`/`SBIT`/`TBIT Rx,Ry`: bit index = `R[Ry] & 0x3F`, bit 0 = MSB
    /// of the pair (Ridge numbering, spec.md §4.5.3).
    fn exec_bit_op(&mut self, instr: &Instruction) -> Option<Event> {
        use crate::decode::Opcode;

        let rx = instr.rx as usize;
        let ry = instr.ry as usize;
        let bit_index = self.registers.r[ry] & 0x3F;
        let mask = 1u64 << (63 - bit_index);
        let pair = self.registers.pair(rx);

        match instr.op {
            Opcode::Cbit => self.registers.set_pair(rx, pair & !mask),
            Opcode::Sbit => self.registers.set_pair(rx, pair | mask),
            Opcode::Tbit => self.registers.r[rx] = u32::from(pair & mask != 0),
            _ => unreachable!(),
        }
        None
    }

    pub(crate) fn exec_alu_immediate(&mut self, instr: &Instruction) -> Option<Event> {
        use crate::decode::Opcode;

        let rx = instr.rx as usize;
        let imm = sign_extend_nibble(instr.ry);
        let r = &mut self.registers.r;

        match instr.op {
            Opcode::MoveI => r[rx] = imm as u32,
            Opcode::AddI => r[rx] = r[rx].wrapping_add(imm as u32),
            Opcode::SubI => r[rx] = r[rx].wrapping_sub(imm as u32),
            Opcode::MpyI => r[rx] = (r[rx] as i32).wrapping_mul(imm) as u32,
            Opcode::NotI => r[rx] = !(imm as u32),
            Opcode::AndI => r[rx] &= imm as u32,
            Opcode::ChkI => {
                if (r[rx] as i32) > imm {
                    return Some(Event::ArithmeticTrap);
                }
            }
            _ => unreachable!("exec_alu_immediate dispatched for non-immediate opcode"),
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
    fn add_accumulates_into_rx() {
        let mut cpu = Processor::new(0x1000, NullBus);
        cpu.registers.r[2] = 3;
        cpu.registers.r[3] = 0;
        cpu.exec_alu(&instr(Opcode::Add, 3, 2));
        assert_eq!(cpu.registers.r[3], 3);
    }

    #[test]
    fn div_by_zero_is_a_silent_no_op() {
        let mut cpu = Processor::new(0x1000, NullBus);
        cpu.registers.r[0] = 42;
        cpu.registers.r[1] = 0;
        cpu.exec_alu(&instr(Opcode::Div, 0, 1));
        assert_eq!(cpu.registers.r[0], 42);
    }

    #[test]
    fn chk_traps_when_rx_greater_than_ry() {
        let mut cpu = Processor::new(0x1000, NullBus);
        cpu.registers.r[0] = 5;
        cpu.registers.r[1] = 3;
        let event = cpu.exec_alu(&instr(Opcode::Chk, 0, 1));
        assert_eq!(event, Some(Event::ArithmeticTrap));
    }

    #[test]
    fn cbit_clears_msb_of_pair() {
        let mut cpu = Processor::new(0x1000, NullBus);
        cpu.registers.r[6] = 0xFFFF_FFFF;
        cpu.registers.r[7] = 0xFFFF_FFFF;
        cpu.registers.r[8] = 0;
        cpu.exec_alu(&instr(Opcode::Cbit, 6, 8));
        assert_eq!(cpu.registers.r[6], 0x7FFF_FFFF);
        assert_eq!(cpu.registers.r[7], 0xFFFF_FFFF);

        cpu.registers.r[8] = 63;
        cpu.exec_alu(&instr(Opcode::Cbit, 6, 8));
        assert_eq!(cpu.registers.r[7], 0xFFFF_FFFE);
    }

    #[test]
    fn noti_ignores_rx_and_complements_the_immediate() {
        let mut cpu = Processor::new(0x1000, NullBus);
        cpu.registers.r[0] = 0xDEAD_BEEF;
        cpu.exec_alu_immediate(&instr(Opcode::NotI, 0, 3));
        assert_eq!(cpu.registers.r[0], !3u32);
    }
}
