//! Opcode handlers, grouped the way spec.md §4.5.1 groups the opcode
//! table: one file per functional cluster, each contributing `impl`
//! blocks to `Processor` that `cpu::execute` dispatches into.

mod alu;
mod control;
mod extended;
mod memref;
mod privileged;
mod shifts;
