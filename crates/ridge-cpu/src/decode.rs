//! Instruction decode (spec.md §4.4).
//!
//! The ≈180-opcode taxonomy is represented as a small closed enum whose
//! variants carry the condition/width/addressing-mode data that would
//! otherwise require a separate variant per combination (24 branch forms,
//! 16 load forms, 16 store forms, ...). This keeps the dispatch table in
//! `execute` a single match over ~45 arms instead of ~180.

use crate::memory::{MemoryController, Segment, TranslationContext};
use ridge_core::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Gt,
    Lt,
    Eq,
    Lteq,
    Gteq,
    Neq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    Byte,
    Half,
    Word,
    Double,
}

/// `c` forms are PC-relative (base = `opc`, the instruction's own start
/// address); `d` forms are absolute (base = 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    PcRelative,
    Absolute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftKind {
    Lsl,
    Lsr,
    Asl,
    Asr,
    Dlsl,
    Dlsr,
    Csl,
}

/// A decoded opcode. `bool` fields that appear alongside `Condition` or
/// `Width` mean "immediate-compare form" / "indexed by R[Ry]" depending on
/// context; see the call sites in `execute`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Move,
    Neg,
    Not,
    Add,
    Sub,
    Mpy,
    Div,
    Rem,
    Or,
    Xor,
    And,
    Cbit,
    Sbit,
    Tbit,
    Chk,

    AddI,
    MoveI,
    SubI,
    MpyI,
    NotI,
    AndI,
    ChkI,

    /// `bool` = immediate form (shift count is the `ry` nibble, not R[Ry]).
    Shift(ShiftKind, bool),
    Seb,
    Seh,

    Lcomp,
    Dcomp,
    Eadd,
    Esub,
    Empy,
    Ediv,
    /// Unimplemented floating-point opcode (spec.md §1, §4.5.1): always
    /// raises `IllegalInstruction`. Carries the mnemonic only for
    /// debugger/`Observable` display, never used by dispatch logic.
    FloatStub(&'static str),

    Sus,
    Lus,
    Rum,
    Ldregs,
    Trans,
    Dirt,
    MoveSr,
    MoveRs,
    Maint,
    Read,
    Write,

    /// `bool` = immediate-compare form.
    Test(Condition, bool),

    Callr,
    Ret,
    Kcall,
    Trap,

    /// `bool` = immediate-compare form (`_si`/`_li` vs `_s`/`_l`).
    Branch(Condition, bool),
    Loop,
    Call,
    Br,

    /// `bool` = indexed (`R[Ry]` added to the effective address).
    Load(Width, AddressMode, bool),
    Store(Width, AddressMode, bool),
    /// LADDR has no width: it only ever computes an effective address.
    Laddr(AddressMode, bool),

    /// Opcode byte matched no table entry (spec.md §9, "table holes ->
    /// IllegalInstruction").
    Illegal,
}

/// A decoded, immutable instruction record (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub op: Opcode,
    pub opcode_byte: u8,
    pub rx: u8,
    pub ry: u8,
    pub displacement: i32,
    pub branch_address: u32,
    pub length: u8,
}

impl Instruction {
    fn register_form(op: Opcode, opcode_byte: u8, rx: u8, ry: u8) -> Self {
        Self {
            op,
            opcode_byte,
            rx,
            ry,
            displacement: 0,
            branch_address: 0,
            length: 2,
        }
    }

    fn fault_stub() -> Self {
        Self {
            op: Opcode::Illegal,
            opcode_byte: 0,
            rx: 0,
            ry: 0,
            displacement: 0,
            branch_address: 0,
            length: 0,
        }
    }
}

/// Lookup for the register/immediate format (`opcode & 0x80 == 0`).
fn lookup_register_format(byte: u8) -> Opcode {
    use Condition::{Eq, Gt, Gteq, Lt, Lteq, Neq};
    use Opcode::{
        Add, AddI, And, AndI, Callr, Chk, ChkI, Cbit, Div, Dcomp, Dirt, Eadd, Ediv, Empy, Esub,
        Kcall, Lcomp, Ldregs, Lus, Maint, Move, MoveI, MoveRs, MoveSr, Mpy, MpyI, Neg, Not, NotI,
        Or, Read, Rem, Ret, Rum, Sbit, Seb, Seh, Shift, Sub, SubI, Sus, Tbit, Test, Trans, Trap,
        Write, Xor,
    };
    use ShiftKind::{Asl, Asr, Csl, Dlsl, Dlsr, Lsl, Lsr};

    match byte {
        0x00 => Move,
        0x01 => Neg,
        0x02 => Not,
        0x03 => Add,
        0x04 => Sub,
        0x05 => Mpy,
        0x06 => Div,
        0x07 => Rem,
        0x08 => Or,
        0x09 => Xor,
        0x0A => And,
        0x0B => Cbit,
        0x0C => Sbit,
        0x0D => Tbit,
        0x0E => Chk,

        0x10 => AddI,
        0x11 => MoveI,
        0x12 => SubI,
        0x13 => MpyI,
        0x14 => NotI,
        0x15 => AndI,
        0x16 => ChkI,

        0x20 => Shift(Lsl, false),
        0x21 => Shift(Lsr, false),
        0x22 => Shift(Asl, false),
        0x23 => Shift(Asr, false),
        0x24 => Shift(Dlsl, false),
        0x25 => Shift(Dlsr, false),
        0x26 => Shift(Csl, false),

        0x28 => Shift(Lsl, true),
        0x29 => Shift(Lsr, true),
        0x2A => Shift(Asl, true),
        0x2B => Shift(Asr, true),
        0x2C => Shift(Dlsl, true),
        0x2D => Shift(Dlsr, true),
        0x2E => Shift(Csl, true),

        0x30 => Seb,
        0x31 => Seh,

        0x38 => Lcomp,
        0x39 => Dcomp,
        0x3A => Eadd,
        0x3B => Esub,
        0x3C => Empy,
        0x3D => Ediv,

        0x3E => Opcode::FloatStub("FIXT"),
        0x3F => Opcode::FloatStub("FIXR"),
        0x40 => Opcode::FloatStub("RNEG"),
        0x41 => Opcode::FloatStub("RADD"),
        0x42 => Opcode::FloatStub("RSUB"),
        0x43 => Opcode::FloatStub("RMPY"),
        0x44 => Opcode::FloatStub("RDIV"),
        0x45 => Opcode::FloatStub("MAKERD"),
        0x46 => Opcode::FloatStub("FLOAT"),
        0x47 => Opcode::FloatStub("RCOMP"),
        0x48 => Opcode::FloatStub("DFIXT"),
        0x49 => Opcode::FloatStub("DFIXR"),
        0x4A => Opcode::FloatStub("DRNEG"),
        0x4B => Opcode::FloatStub("DRADD"),
        0x4C => Opcode::FloatStub("DRSUB"),
        0x4D => Opcode::FloatStub("DRMPY"),
        0x4E => Opcode::FloatStub("DRDIV"),
        0x4F => Opcode::FloatStub("MAKEDR"),
        0x50 => Opcode::FloatStub("DFLOAT"),
        0x51 => Opcode::FloatStub("DRCOMP"),

        0x58 => Sus,
        0x59 => Lus,
        0x5A => Rum,
        0x5B => Ldregs,
        0x5C => Trans,
        0x5D => Dirt,
        0x5E => MoveSr,
        0x5F => MoveRs,
        0x60 => Maint,
        0x61 => Read,
        0x62 => Write,

        0x68 => Test(Gt, false),
        0x69 => Test(Lt, false),
        0x6A => Test(Eq, false),
        0x6B => Test(Lteq, false),
        0x6C => Test(Gteq, false),
        0x6D => Test(Neq, false),

        0x70 => Test(Gt, true),
        0x71 => Test(Lt, true),
        0x72 => Test(Eq, true),
        0x73 => Test(Lteq, true),
        0x74 => Test(Gteq, true),
        0x75 => Test(Neq, true),

        0x78 => Callr,
        0x79 => Ret,
        0x7A => Kcall,
        0x7B => Trap,

        _ => Opcode::Illegal,
    }
}

/// Lookup for the memory-reference format, keyed by `opcode & 0xEF` (the
/// byte with the long/short flag masked out — spec.md §4.4).
fn lookup_memory_ref(base_short: u8) -> Opcode {
    use AddressMode::{Absolute, PcRelative};
    use Condition::{Eq, Gt, Gteq, Lt, Lteq, Neq};
    use Opcode::{Br, Call, Laddr, Load, Loop, Store};
    use Width::{Byte, Double, Half, Word};

    match base_short {
        0x80 => Opcode::Branch(Gt, false),
        0x81 => Opcode::Branch(Lt, false),
        0x82 => Opcode::Branch(Eq, false),
        0x83 => Opcode::Branch(Lteq, false),
        0x84 => Opcode::Branch(Gteq, false),
        0x85 => Opcode::Branch(Neq, false),
        0x86 => Opcode::Branch(Gt, true),
        0x87 => Opcode::Branch(Lt, true),
        0x88 => Opcode::Branch(Eq, true),
        0x89 => Opcode::Branch(Lteq, true),
        0x8A => Opcode::Branch(Gteq, true),
        0x8B => Opcode::Branch(Neq, true),
        0x8C => Loop,
        0x8D => Call,
        0x8E => Br,

        0xA0 => Load(Byte, PcRelative, false),
        0xA1 => Load(Byte, PcRelative, true),
        0xA2 => Load(Byte, Absolute, false),
        0xA3 => Load(Byte, Absolute, true),
        0xA4 => Load(Half, PcRelative, false),
        0xA5 => Load(Half, PcRelative, true),
        0xA6 => Load(Half, Absolute, false),
        0xA7 => Load(Half, Absolute, true),
        0xA8 => Load(Word, PcRelative, false),
        0xA9 => Load(Word, PcRelative, true),
        0xAA => Load(Word, Absolute, false),
        0xAB => Load(Word, Absolute, true),
        0xAC => Load(Double, PcRelative, false),
        0xAD => Load(Double, PcRelative, true),
        0xAE => Load(Double, Absolute, false),
        0xAF => Load(Double, Absolute, true),

        0xC0 => Store(Byte, PcRelative, false),
        0xC1 => Store(Byte, PcRelative, true),
        0xC2 => Store(Byte, Absolute, false),
        0xC3 => Store(Byte, Absolute, true),
        0xC4 => Store(Half, PcRelative, false),
        0xC5 => Store(Half, PcRelative, true),
        0xC6 => Store(Half, Absolute, false),
        0xC7 => Store(Half, Absolute, true),
        0xC8 => Store(Word, PcRelative, false),
        0xC9 => Store(Word, PcRelative, true),
        0xCA => Store(Word, Absolute, false),
        0xCB => Store(Word, Absolute, true),
        0xCC => Store(Double, PcRelative, false),
        0xCD => Store(Double, PcRelative, true),
        0xCE => Store(Double, Absolute, false),
        0xCF => Store(Double, Absolute, true),

        0xE0 => Laddr(PcRelative, false),
        0xE1 => Laddr(PcRelative, true),
        0xE2 => Laddr(Absolute, false),
        0xE3 => Laddr(Absolute, true),

        _ => Opcode::Illegal,
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct InstructionDecoder;

impl InstructionDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Virtual fetch (spec.md §4.4): translates through `Segment::Code`
    /// when `ctx.mode` is `User`, passes through untranslated in `Kernel`.
    /// Returns `page_fault=true` if any of the (up to three) sub-reads
    /// faults; on fault the returned `Instruction` is a stub and must not
    /// be executed (spec.md §3, "PC must not advance").
    pub fn decode(
        &self,
        memory: &mut MemoryController,
        ctx: &TranslationContext,
        address: u32,
    ) -> Result<(Instruction, bool), CoreError> {
        let first = memory.read_halfword_v(address, Segment::Code, ctx)?;
        if first.page_fault {
            return Ok((Instruction::fault_stub(), true));
        }
        let opcode_byte = (first.value >> 8) as u8;
        let rx = ((first.value >> 4) & 0xF) as u8;
        let ry = (first.value & 0xF) as u8;

        if opcode_byte & 0x80 == 0 {
            let op = lookup_register_format(opcode_byte);
            return Ok((Instruction::register_form(op, opcode_byte, rx, ry), false));
        }

        let is_long = opcode_byte & 0x10 != 0;
        let op = lookup_memory_ref(opcode_byte & 0xEF);

        if is_long {
            let hi = memory.read_halfword_v(address.wrapping_add(2), Segment::Code, ctx)?;
            let lo = memory.read_halfword_v(address.wrapping_add(4), Segment::Code, ctx)?;
            if hi.page_fault || lo.page_fault {
                return Ok((Instruction::fault_stub(), true));
            }
            let displacement = ((u32::from(hi.value) << 16) | u32::from(lo.value)) as i32;
            let branch_address = address.wrapping_add(displacement as u32) & !1;
            Ok((
                Instruction {
                    op,
                    opcode_byte,
                    rx,
                    ry,
                    displacement,
                    branch_address,
                    length: 6,
                },
                false,
            ))
        } else {
            let half = memory.read_halfword_v(address.wrapping_add(2), Segment::Code, ctx)?;
            if half.page_fault {
                return Ok((Instruction::fault_stub(), true));
            }
            let displacement = i32::from(half.value as i16);
            let branch_address = address.wrapping_add(displacement as u32) & !1;
            Ok((
                Instruction {
                    op,
                    opcode_byte,
                    rx,
                    ry,
                    displacement,
                    branch_address,
                    length: 4,
                },
                false,
            ))
        }
    }

    /// Raw (kernel-mode) fetch: bypasses translation, so it can never
    /// page-fault.
    #[must_use]
    pub fn decode_raw(&self, memory: &MemoryController, address: u32) -> Instruction {
        let first = memory.read_halfword(address);
        let opcode_byte = (first >> 8) as u8;
        let rx = ((first >> 4) & 0xF) as u8;
        let ry = (first & 0xF) as u8;

        if opcode_byte & 0x80 == 0 {
            let op = lookup_register_format(opcode_byte);
            return Instruction::register_form(op, opcode_byte, rx, ry);
        }

        let is_long = opcode_byte & 0x10 != 0;
        let op = lookup_memory_ref(opcode_byte & 0xEF);

        if is_long {
            let raw = memory.read_word(address.wrapping_add(2));
            let displacement = raw as i32;
            let branch_address = address.wrapping_add(displacement as u32) & !1;
            Instruction {
                op,
                opcode_byte,
                rx,
                ry,
                displacement,
                branch_address,
                length: 6,
            }
        } else {
            let raw = memory.read_halfword(address.wrapping_add(2));
            let displacement = i32::from(raw as i16);
            let branch_address = address.wrapping_add(displacement as u32) & !1;
            Instruction {
                op,
                opcode_byte,
                rx,
                ry,
                displacement,
                branch_address,
                length: 4,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryController;
    use crate::registers::ProcessorMode;

    fn kernel_ctx() -> TranslationContext {
        TranslationContext {
            mode: ProcessorMode::Kernel,
            code_segment: 0,
            data_segment: 0,
            vrt_base: 0,
            vrt_mask: 0,
        }
    }

    #[test]
    fn move_decodes_as_two_byte_register_form() {
        let mut mem = MemoryController::new(0x1000);
        mem.write_halfword(0x3E000, 0x0010);
        let decoder = InstructionDecoder::new();
        let (instr, fault) = decoder.decode(&mut mem, &kernel_ctx(), 0x3E000).unwrap();
        assert!(!fault);
        assert_eq!(instr.op, Opcode::Move);
        assert_eq!(instr.rx, 1);
        assert_eq!(instr.ry, 0);
        assert_eq!(instr.length, 2);
    }

    #[test]
    fn movei_r2_3() {
        let mut mem = MemoryController::new(0x1000);
        mem.write_halfword(0x3E000, 0x1123);
        let decoder = InstructionDecoder::new();
        let (instr, fault) = decoder.decode(&mut mem, &kernel_ctx(), 0x3E000).unwrap();
        assert!(!fault);
        assert_eq!(instr.op, Opcode::MoveI);
        assert_eq!(instr.rx, 2);
        assert_eq!(instr.ry, 3);
    }

    #[test]
    fn long_branch_eq_decodes_and_computes_branch_address() {
        let mut mem = MemoryController::new(0x2000);
        mem.write_halfword(0x1000, 0x9212);
        mem.write_word(0x1002, 0x0000_0010);
        let decoder = InstructionDecoder::new();
        let (instr, fault) = decoder.decode(&mut mem, &kernel_ctx(), 0x1000).unwrap();
        assert!(!fault);
        assert_eq!(instr.op, Opcode::Branch(Condition::Eq, false));
        assert_eq!(instr.rx, 1);
        assert_eq!(instr.ry, 2);
        assert_eq!(instr.length, 6);
        assert_eq!(instr.branch_address, 0x1010);
    }

    #[test]
    fn unrecognised_byte_is_illegal() {
        let mut mem = MemoryController::new(0x1000);
        mem.write_halfword(0x0, 0x1700);
        let decoder = InstructionDecoder::new();
        let (instr, fault) = decoder.decode(&mut mem, &kernel_ctx(), 0x0).unwrap();
        assert!(!fault);
        assert_eq!(instr.op, Opcode::Illegal);
    }

    #[test]
    fn raw_fetch_never_faults() {
        let mut mem = MemoryController::new(0x1000);
        mem.write_halfword(0x3E000, 0x0010);
        let decoder = InstructionDecoder::new();
        let instr = decoder.decode_raw(&mem, 0x3E000);
        assert_eq!(instr.op, Opcode::Move);
    }
}
