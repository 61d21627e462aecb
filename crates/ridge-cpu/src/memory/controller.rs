//! Composes `PhysicalMemory` + `VirtualMemoryTranslator` (spec.md §4.3).
//!
//! `MemoryController` never raises an event itself — it hands back a
//! `page_fault` flag and lets the `Processor` decide what to do with it
//! (spec.md §9, "Events vs. exceptions"). It also never checks alignment;
//! that check lives in the `Processor`, which is the only place that knows
//! which `DataAlignment` event to raise.
//!
//! The virtual-access methods take the current mode and the segment/VRT
//! registers as explicit parameters rather than holding a back-reference
//! to the `Processor` (spec.md §9, "Bidirectional Processor ↔
//! MemoryController dependency").

use ridge_core::CoreError;

use crate::registers::ProcessorMode;

use super::physical::PhysicalMemory;
use super::vrt::VirtualMemoryTranslator;

/// Selects which segment register (SR8 or SR9) a virtual access translates
/// through, per spec.md §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Code,
    Data,
}

/// The subset of processor state a virtual access needs to translate —
/// passed in explicitly rather than borrowed back from the `Processor`.
#[derive(Debug, Clone, Copy)]
pub struct TranslationContext {
    pub mode: ProcessorMode,
    pub code_segment: u32,
    pub data_segment: u32,
    pub vrt_base: u32,
    pub vrt_mask: u32,
}

impl TranslationContext {
    #[must_use]
    pub fn segment_number(&self, segment: Segment) -> u32 {
        match segment {
            Segment::Code => self.code_segment,
            Segment::Data => self.data_segment,
        }
    }
}

/// Result of a virtual access: either the translated value, or a page
/// fault (value is meaningless in that case).
#[derive(Debug, Clone, Copy)]
pub struct VAccess<T> {
    pub value: T,
    pub page_fault: bool,
}

#[derive(Debug)]
pub struct MemoryController {
    physical: PhysicalMemory,
    translator: VirtualMemoryTranslator,
}

impl MemoryController {
    #[must_use]
    pub fn new(size_bytes: usize) -> Self {
        Self {
            physical: PhysicalMemory::new(size_bytes),
            translator: VirtualMemoryTranslator::new(),
        }
    }

    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.physical.len()
    }

    // ---- Raw (non-translating) family: kernel-mode access and VRT-walk
    // internals both go through these. ----

    #[must_use]
    pub fn read_byte(&self, addr: u32) -> u8 {
        self.physical.read_byte(addr)
    }

    pub fn write_byte(&mut self, addr: u32, value: u8) {
        self.physical.write_byte(addr, value);
    }

    #[must_use]
    pub fn read_halfword(&self, addr: u32) -> u16 {
        self.physical.read_halfword(addr)
    }

    pub fn write_halfword(&mut self, addr: u32, value: u16) {
        self.physical.write_halfword(addr, value);
    }

    #[must_use]
    pub fn read_word(&self, addr: u32) -> u32 {
        self.physical.read_word(addr)
    }

    pub fn write_word(&mut self, addr: u32, value: u32) {
        self.physical.write_word(addr, value);
    }

    #[must_use]
    pub fn read_doubleword(&self, addr: u32) -> u64 {
        self.physical.read_doubleword(addr)
    }

    pub fn write_doubleword(&mut self, addr: u32, value: u64) {
        self.physical.write_doubleword(addr, value);
    }

    /// Translate `addr` through `segment`, or pass it through unchanged in
    /// kernel mode. `modified`/`referenced` drive the VRT M/R bit update
    /// on a successful match (spec.md §4.2).
    fn translate(
        &mut self,
        addr: u32,
        segment: Segment,
        ctx: &TranslationContext,
        modified: bool,
        referenced: bool,
    ) -> Result<VAccess<u32>, CoreError> {
        match ctx.mode {
            ProcessorMode::Kernel => Ok(VAccess {
                value: addr,
                page_fault: false,
            }),
            ProcessorMode::User => {
                let seg_number = ctx.segment_number(segment);
                let t = self.translator.translate(
                    &mut self.physical,
                    ctx.vrt_base,
                    ctx.vrt_mask,
                    seg_number,
                    addr,
                    modified,
                    referenced,
                )?;
                Ok(VAccess {
                    value: t.real,
                    page_fault: t.page_fault,
                })
            }
        }
    }

    pub fn read_byte_v(
        &mut self,
        addr: u32,
        segment: Segment,
        ctx: &TranslationContext,
    ) -> Result<VAccess<u8>, CoreError> {
        let t = self.translate(addr, segment, ctx, false, true)?;
        Ok(VAccess {
            value: if t.page_fault { 0 } else { self.physical.read_byte(t.value) },
            page_fault: t.page_fault,
        })
    }

    pub fn write_byte_v(
        &mut self,
        addr: u32,
        segment: Segment,
        ctx: &TranslationContext,
        value: u8,
    ) -> Result<bool, CoreError> {
        let t = self.translate(addr, segment, ctx, true, true)?;
        if !t.page_fault {
            self.physical.write_byte(t.value, value);
        }
        Ok(t.page_fault)
    }

    pub fn read_halfword_v(
        &mut self,
        addr: u32,
        segment: Segment,
        ctx: &TranslationContext,
    ) -> Result<VAccess<u16>, CoreError> {
        let t = self.translate(addr, segment, ctx, false, true)?;
        Ok(VAccess {
            value: if t.page_fault { 0 } else { self.physical.read_halfword(t.value) },
            page_fault: t.page_fault,
        })
    }

    pub fn write_halfword_v(
        &mut self,
        addr: u32,
        segment: Segment,
        ctx: &TranslationContext,
        value: u16,
    ) -> Result<bool, CoreError> {
        let t = self.translate(addr, segment, ctx, true, true)?;
        if !t.page_fault {
            self.physical.write_halfword(t.value, value);
        }
        Ok(t.page_fault)
    }

    pub fn read_word_v(
        &mut self,
        addr: u32,
        segment: Segment,
        ctx: &TranslationContext,
    ) -> Result<VAccess<u32>, CoreError> {
        let t = self.translate(addr, segment, ctx, false, true)?;
        Ok(VAccess {
            value: if t.page_fault { 0 } else { self.physical.read_word(t.value) },
            page_fault: t.page_fault,
        })
    }

    pub fn write_word_v(
        &mut self,
        addr: u32,
        segment: Segment,
        ctx: &TranslationContext,
        value: u32,
    ) -> Result<bool, CoreError> {
        let t = self.translate(addr, segment, ctx, true, true)?;
        if !t.page_fault {
            self.physical.write_word(t.value, value);
        }
        Ok(t.page_fault)
    }

    pub fn read_doubleword_v(
        &mut self,
        addr: u32,
        segment: Segment,
        ctx: &TranslationContext,
    ) -> Result<VAccess<u64>, CoreError> {
        let t = self.translate(addr, segment, ctx, false, true)?;
        Ok(VAccess {
            value: if t.page_fault { 0 } else { self.physical.read_doubleword(t.value) },
            page_fault: t.page_fault,
        })
    }

    pub fn write_doubleword_v(
        &mut self,
        addr: u32,
        segment: Segment,
        ctx: &TranslationContext,
        value: u64,
    ) -> Result<bool, CoreError> {
        let t = self.translate(addr, segment, ctx, true, true)?;
        if !t.page_fault {
            self.physical.write_doubleword(t.value, value);
        }
        Ok(t.page_fault)
    }

    /// `TRANS`/`DIRT` opcode support: translate without performing a data
    /// access (spec.md §4.5.3).
    pub fn probe(
        &mut self,
        segment_number: u32,
        vaddr: u32,
        modified: bool,
        ctx: &TranslationContext,
    ) -> Result<VAccess<u32>, CoreError> {
        let t = self
            .translator
            .translate(&mut self.physical, ctx.vrt_base, ctx.vrt_mask, segment_number, vaddr, modified, true)?;
        Ok(VAccess {
            value: t.real,
            page_fault: t.page_fault,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(mode: ProcessorMode) -> TranslationContext {
        TranslationContext {
            mode,
            code_segment: 1,
            data_segment: 2,
            vrt_base: 0x10000,
            vrt_mask: 0xFFFF_FFFF,
        }
    }

    #[test]
    fn kernel_mode_passes_through_untranslated() {
        let mut mc = MemoryController::new(0x2000);
        let c = ctx(ProcessorMode::Kernel);
        mc.write_word_v(0x100, Segment::Data, &c, 0xCAFEBABE).unwrap();
        assert_eq!(mc.read_word(0x100), 0xCAFEBABE);
    }

    #[test]
    fn user_mode_data_access_with_all_zero_vrt_faults() {
        let mut mc = MemoryController::new(0x20000);
        let c = ctx(ProcessorMode::User);
        let r = mc.read_word_v(0x800, Segment::Data, &c).unwrap();
        assert!(r.page_fault);
    }

    #[test]
    fn writes_set_modified_and_referenced_bits() {
        let mut mc = MemoryController::new(0x20000);
        let c = ctx(ProcessorMode::User);
        let vaddr = 0x0000_3000u32;
        let probe = ((vaddr >> 12) + c.data_segment) * 8 + c.vrt_base;
        mc.write_word(probe, (c.data_segment << 16) | (vaddr >> 16));
        mc.write_word(probe + 4, 0x7000);

        mc.write_byte_v(vaddr, Segment::Data, &c, 0xAB).unwrap();
        let e1 = mc.read_word(probe + 4);
        assert_eq!(e1 & 0x800, 0x800);
        assert_eq!(e1 & 0x8000, 0x8000);
    }
}
