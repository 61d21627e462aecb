//! Ridge 32 instruction decode, segmented-memory translation, and event
//! dispatch — the cycle-level core the host harness drives one `step` at
//! a time (spec.md §1).
//!
//! `ridge-core` defines the machine-agnostic seams (`ExternalBus`,
//! `Observable`, `CoreError`); everything Ridge-specific — opcodes, the
//! VRT, the CCB/PCB layouts, register semantics — lives here.

mod cpu;
mod decode;
mod events;
mod execute;
pub mod layout;
mod memory;
mod registers;

pub use cpu::Processor;
pub use decode::{AddressMode, Condition, Instruction, InstructionDecoder, Opcode, ShiftKind, Width};
pub use events::{Event, EventDispatcher};
pub use memory::{MemoryController, PhysicalMemory, Segment, Translation, TranslationContext, VAccess, VirtualMemoryTranslator};
pub use registers::{ProcessorMode, Registers};
