//! Memory-reference opcodes: LOAD, STORE, LADDR (spec.md §4.3, §4.5.1,
//! §4.5.3).
//!
//! Alignment is enforced here, before any translation is attempted
//! (spec.md §9, "Alignment enforced at the Processor level"):
//! `MemoryController` never raises an event itself.

use ridge_core::{CoreError, ExternalBus};

use crate::cpu::Processor;
use crate::decode::{AddressMode, Instruction, Width};
use crate::events::Event;
use crate::memory::Segment;
use crate::registers::ProcessorMode;

fn effective_address(instr: &Instruction, mode: AddressMode, indexed: bool, opc: u32, index_reg: u32) -> u32 {
    let base = match mode {
        AddressMode::PcRelative => opc,
        AddressMode::Absolute => 0,
    };
    let addr = base.wrapping_add(instr.displacement as u32);
    if indexed {
        addr.wrapping_add(index_reg)
    } else {
        addr
    }
}

fn alignment_for(width: Width) -> u32 {
    match width {
        Width::Byte => 1,
        Width::Half => 2,
        Width::Word => 4,
        Width::Double => 8,
    }
}

impl<B: ExternalBus> Processor<B> {
    pub(crate) fn exec_load(
        &mut self,
        instr: &Instruction,
        width: Width,
        mode: AddressMode,
        indexed: bool,
        opc: u32,
    ) -> Result<Option<Event>, CoreError> {
        let index_reg = self.registers.r[instr.ry as usize];
        let addr = effective_address(instr, mode, indexed, opc, index_reg);

        if addr % alignment_for(width) != 0 {
            return Ok(Some(Event::DataAlignment));
        }

        let rx = instr.rx as usize;
        let ctx = self.ctx();

        let (value, page_fault): (u64, bool) = match self.registers.mode {
            ProcessorMode::Kernel => (self.raw_load(addr, width), false),
            ProcessorMode::User => match width {
                Width::Byte => {
                    let v = self.memory.read_byte_v(addr, Segment::Data, &ctx)?;
                    (u64::from(v.value), v.page_fault)
                }
                Width::Half => {
                    let v = self.memory.read_halfword_v(addr, Segment::Data, &ctx)?;
                    (u64::from(v.value), v.page_fault)
                }
                Width::Word => {
                    let v = self.memory.read_word_v(addr, Segment::Data, &ctx)?;
                    (u64::from(v.value), v.page_fault)
                }
                Width::Double => {
                    let v = self.memory.read_doubleword_v(addr, Segment::Data, &ctx)?;
                    (v.value, v.page_fault)
                }
            },
        };

        if page_fault {
            return Ok(Some(Event::PageFault {
                segment: self.registers.sr[9],
                address: addr,
            }));
        }

        if width == Width::Double {
            self.registers.set_pair(rx, value);
        } else {
            self.registers.r[rx] = value as u32;
        }
        Ok(None)
    }

    fn raw_load(&self, addr: u32, width: Width) -> u64 {
        match width {
            Width::Byte => u64::from(self.memory.read_byte(addr)),
            Width::Half => u64::from(self.memory.read_halfword(addr)),
            Width::Word => u64::from(self.memory.read_word(addr)),
            Width::Double => self.memory.read_doubleword(addr),
        }
    }

    pub(crate) fn exec_store(
        &mut self,
        instr: &Instruction,
        width: Width,
        mode: AddressMode,
        indexed: bool,
        opc: u32,
    ) -> Result<Option<Event>, CoreError> {
        let index_reg = self.registers.r[instr.ry as usize];
        let addr = effective_address(instr, mode, indexed, opc, index_reg);

        if addr % alignment_for(width) != 0 {
            return Ok(Some(Event::DataAlignment));
        }

        let rx = instr.rx as usize;
        let ctx = self.ctx();

        let page_fault = match self.registers.mode {
            ProcessorMode::Kernel => {
                self.raw_store(addr, width, rx);
                false
            }
            ProcessorMode::User => match width {
                Width::Byte => self.memory.write_byte_v(addr, Segment::Data, &ctx, self.registers.r[rx] as u8)?,
                Width::Half => self.memory.write_halfword_v(addr, Segment::Data, &ctx, self.registers.r[rx] as u16)?,
                Width::Word => self.memory.write_word_v(addr, Segment::Data, &ctx, self.registers.r[rx])?,
                Width::Double => {
                    self.memory
                        .write_doubleword_v(addr, Segment::Data, &ctx, self.registers.pair(rx))?
                }
            },
        };

        if page_fault {
            return Ok(Some(Event::PageFault {
                segment: self.registers.sr[9],
                address: addr,
            }));
        }
        Ok(None)
    }

    fn raw_store(&mut self, addr: u32, width: Width, rx: usize) {
        match width {
            Width::Byte => self.memory.write_byte(addr, self.registers.r[rx] as u8),
            Width::Half => self.memory.write_halfword(addr, self.registers.r[rx] as u16),
            Width::Word => self.memory.write_word(addr, self.registers.r[rx]),
            Width::Double => self.memory.write_doubleword(addr, self.registers.pair(rx)),
        }
    }

    /// `LADDR Rx,Ry`: computes the effective address without touching
    /// memory at all, so it cannot fault or misalign.
    pub(crate) fn exec_laddr(&mut self, instr: &Instruction, mode: AddressMode, indexed: bool, opc: u32) -> Option<Event> {
        let index_reg = self.registers.r[instr.ry as usize];
        let addr = effective_address(instr, mode, indexed, opc, index_reg);
        self.registers.r[instr.rx as usize] = addr;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::tests::NullBus;
    use crate::decode::Opcode;

    fn instr(op: Opcode, rx: u8, ry: u8, displacement: i32) -> Instruction {
        Instruction {
            op,
            opcode_byte: 0,
            rx,
            ry,
            displacement,
            branch_address: 0,
            length: 4,
        }
    }

    #[test]
    fn kernel_mode_word_store_then_load() {
        let mut cpu = Processor::new(0x2000, NullBus);
        cpu.registers.r[1] = 0xCAFEBABE;
        cpu.exec_store(
            &instr(Opcode::Store(Width::Word, AddressMode::Absolute, false), 1, 0, 0x100),
            Width::Word,
            AddressMode::Absolute,
            false,
            0,
        )
        .unwrap();
        cpu.exec_load(
            &instr(Opcode::Load(Width::Word, AddressMode::Absolute, false), 2, 0, 0x100),
            Width::Word,
            AddressMode::Absolute,
            false,
            0,
        )
        .unwrap();
        assert_eq!(cpu.registers.r[2], 0xCAFEBABE);
    }

    #[test]
    fn misaligned_word_access_raises_data_alignment() {
        let mut cpu = Processor::new(0x2000, NullBus);
        let event = cpu
            .exec_load(
                &instr(Opcode::Load(Width::Word, AddressMode::Absolute, false), 1, 0, 0x101),
                Width::Word,
                AddressMode::Absolute,
                false,
                0,
            )
            .unwrap();
        assert_eq!(event, Some(Event::DataAlignment));
    }

    #[test]
    fn pc_relative_form_uses_opc_as_base() {
        let mut cpu = Processor::new(0x2000, NullBus);
        cpu.registers.r[3] = 0x1111;
        cpu.exec_store(
            &instr(Opcode::Store(Width::Word, AddressMode::PcRelative, false), 3, 0, 0x10),
            Width::Word,
            AddressMode::PcRelative,
            false,
            0x100,
        )
        .unwrap();
        assert_eq!(cpu.memory.read_word(0x110), 0x1111);
    }

    #[test]
    fn laddr_computes_address_without_touching_memory() {
        let mut cpu = Processor::new(0x2000, NullBus);
        cpu.registers.r[1] = 4;
        cpu.exec_laddr(
            &instr(Opcode::Laddr(AddressMode::PcRelative, true), 0, 1, 0x20),
            AddressMode::PcRelative,
            true,
            0x100,
        );
        assert_eq!(cpu.registers.r[0], 0x124);
    }
}
