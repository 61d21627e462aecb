//! Memory subsystem: flat physical RAM, the VRT walker, and the controller
//! that ties the two together behind a translated/raw access surface
//! (spec.md §4.1-§4.3).

mod controller;
mod physical;
mod vrt;

pub use controller::{MemoryController, Segment, TranslationContext, VAccess};
pub use physical::PhysicalMemory;
pub use vrt::{Translation, VirtualMemoryTranslator};
