//! Comparisons, subroutine linkage, kernel calls, and unconditional
//! transfer of control (spec.md §4.5.1, §4.5.3).

use ridge_core::ExternalBus;

use crate::cpu::Processor;
use crate::decode::{Condition, Instruction};
use crate::events::Event;

fn holds(cond: Condition, value: i32) -> bool {
    match cond {
        Condition::Gt => value > 0,
        Condition::Lt => value < 0,
        Condition::Eq => value == 0,
        Condition::Lteq => value <= 0,
        Condition::Gteq => value >= 0,
        Condition::Neq => value != 0,
    }
}

/// Sign-extend the 4-bit `ry` immediate field, matching the ALU
/// immediate forms (spec.md §4.5.1).
fn sign_extend_nibble(ry: u8) -> i32 {
    (i32::from(ry) << 28) >> 28
}

impl<B: ExternalBus> Processor<B> {
    /// `TEST Rx,Ry[,#]`: compares `R[Rx]` against zero after subtracting
    /// `R[Ry]` (register form) or the sign-extended immediate (immediate
    /// form), setting `R[Rx]` to 1 if the condition holds, 0 otherwise.
    pub(crate) fn exec_test(&mut self, instr: &Instruction, cond: Condition, immediate: bool) -> Option<Event> {
        let rx = instr.rx as usize;
        let rhs = if immediate {
            sign_extend_nibble(instr.ry)
        } else {
            self.registers.r[instr.ry as usize] as i32
        };
        let diff = (self.registers.r[rx] as i32).wrapping_sub(rhs);
        self.registers.r[rx] = u32::from(holds(cond, diff));
        None
    }

    /// `CALLR Rx,Ry`: `PC <- opc + R[Ry]`, then `R[Rx] <- PC` (the
    /// instruction's own end address, already advanced by `step`).
    pub(crate) fn exec_callr(&mut self, instr: &Instruction, opc: u32) -> Option<Event> {
        let return_addr = self.registers.pc;
        let target = opc.wrapping_add(self.registers.r[instr.ry as usize]);
        self.registers.pc = target;
        self.registers.r[instr.rx as usize] = return_addr;
        None
    }

    /// `RET Rx,Ry`: `R[Rx] <- PC` (the return address for a nested caller),
    /// then `PC <- R[Ry]`. `Rx` is written before `PC` moves so `Rx == Ry`
    /// observes the pre-jump value of `Ry`.
    pub(crate) fn exec_ret(&mut self, instr: &Instruction) -> Option<Event> {
        let return_addr = self.registers.pc;
        let target = self.registers.r[instr.ry as usize];
        self.registers.r[instr.rx as usize] = return_addr;
        self.registers.pc = target;
        None
    }

    /// `KCALL Rx,Ry`: user mode only; event number is `(Rx<<4)|Ry`
    /// (spec.md §4.5.3). In kernel mode this is a `KernelViolation`.
    pub(crate) fn exec_kcall(&mut self, instr: &Instruction) -> Option<Event> {
        if self.registers.mode != crate::registers::ProcessorMode::User {
            return Some(Event::KernelViolation {
                d0: u32::from(instr.opcode_byte),
                d1: 0,
                d2: 0,
            });
        }
        let event_number = (instr.rx << 4) | instr.ry;
        Some(Event::Kcall { event_number })
    }

    /// `TRAP Rx,Ry`: `SR3 <- R[Ry]`, then raise `TrapInstruction`.
    pub(crate) fn exec_trap(&mut self, instr: &Instruction) -> Option<Event> {
        self.registers.sr[3] = self.registers.r[instr.ry as usize];
        Some(Event::TrapInstruction)
    }

    /// `Bcc_s`/`Bcc_l`/`Bcc_si`/`Bcc_li`: branch to `instr.branch_address`
    /// if the condition holds against `R[Rx]` compared with `R[Ry]`
    /// (register form) or the immediate encoded in `Ry` (immediate form).
    pub(crate) fn exec_branch(&mut self, instr: &Instruction, cond: Condition, immediate: bool) -> Option<Event> {
        let rhs = if immediate {
            sign_extend_nibble(instr.ry)
        } else {
            self.registers.r[instr.ry as usize] as i32
        };
        let diff = (self.registers.r[instr.rx as usize] as i32).wrapping_sub(rhs);
        if holds(cond, diff) {
            self.registers.pc = instr.branch_address;
        }
        None
    }

    /// `LOOP Rx,Ry`: `R[Rx] += sign_extend(Ry)`; branch to
    /// `instr.branch_address` if the result is negative (signed).
    pub(crate) fn exec_loop(&mut self, instr: &Instruction) -> Option<Event> {
        let rx = instr.rx as usize;
        let delta = sign_extend_nibble(instr.ry);
        let result = (self.registers.r[rx] as i32).wrapping_add(delta);
        self.registers.r[rx] = result as u32;
        if result < 0 {
            self.registers.pc = instr.branch_address;
        }
        None
    }

    /// `CALL Rx,Ry`: unconditional call; `R[Rx] <- PC` (return address),
    /// `PC <- instr.branch_address`.
    pub(crate) fn exec_call(&mut self, instr: &Instruction, opc: u32) -> Option<Event> {
        let _ = opc;
        self.registers.r[instr.rx as usize] = self.registers.pc;
        self.registers.pc = instr.branch_address;
        None
    }

    /// `BR`: unconditional branch, no linkage.
    pub(crate) fn exec_br(&mut self, instr: &Instruction) -> Option<Event> {
        self.registers.pc = instr.branch_address;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::tests::NullBus;
    use crate::decode::Opcode;
    use crate::registers::ProcessorMode;

    fn instr(op: Opcode, rx: u8, ry: u8, branch_address: u32) -> Instruction {
        Instruction {
            op,
            opcode_byte: 0,
            rx,
            ry,
            displacement: 0,
            branch_address,
            length: 2,
        }
    }

    #[test]
    fn test_eq_sets_one_when_equal() {
        let mut cpu = Processor::new(0x1000, NullBus);
        cpu.registers.r[0] = 5;
        cpu.registers.r[1] = 5;
        cpu.exec_test(&instr(Opcode::Test(Condition::Eq, false), 0, 1, 0), Condition::Eq, false);
        assert_eq!(cpu.registers.r[0], 1);
    }

    #[test]
    fn callr_sets_return_address_and_jumps() {
        let mut cpu = Processor::new(0x1000, NullBus);
        cpu.registers.pc = 0x104;
        cpu.registers.r[2] = 0x20;
        cpu.exec_callr(&instr(Opcode::Callr, 1, 2, 0), 0x100);
        assert_eq!(cpu.registers.pc, 0x120);
        assert_eq!(cpu.registers.r[1], 0x104);
    }

    #[test]
    fn ret_restores_pc_from_ry() {
        let mut cpu = Processor::new(0x1000, NullBus);
        cpu.registers.pc = 0x200;
        cpu.registers.r[3] = 0x500;
        cpu.exec_ret(&instr(Opcode::Ret, 1, 3, 0));
        assert_eq!(cpu.registers.pc, 0x500);
        assert_eq!(cpu.registers.r[1], 0x200);
    }

    #[test]
    fn kcall_in_kernel_mode_is_kernel_violation() {
        let mut cpu = Processor::new(0x1000, NullBus);
        cpu.registers.mode = ProcessorMode::Kernel;
        let event = cpu.exec_kcall(&instr(Opcode::Kcall, 1, 2, 0));
        assert!(matches!(event, Some(Event::KernelViolation { .. })));
    }

    #[test]
    fn kcall_in_user_mode_computes_event_number() {
        let mut cpu = Processor::new(0x1000, NullBus);
        cpu.registers.mode = ProcessorMode::User;
        let event = cpu.exec_kcall(&instr(Opcode::Kcall, 1, 2, 0));
        assert_eq!(event, Some(Event::Kcall { event_number: 0x12 }));
    }

    #[test]
    fn loop_branches_when_result_goes_negative() {
        let mut cpu = Processor::new(0x1000, NullBus);
        cpu.registers.r[0] = 0;
        cpu.exec_loop(&instr(Opcode::Loop, 0, 0xF, 0x900));
        assert_eq!(cpu.registers.r[0], 0xFFFF_FFFF);
        assert_eq!(cpu.registers.pc, 0x900);
    }

    #[test]
    fn br_jumps_unconditionally() {
        let mut cpu = Processor::new(0x1000, NullBus);
        cpu.exec_br(&instr(Opcode::Br, 0, 0, 0x42));
        assert_eq!(cpu.registers.pc, 0x42);
    }
}
