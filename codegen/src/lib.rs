//! Build-time helpers for projects using twinboot. Call these from a `build.rs` and write the
//! result to `memory.x`.

pub mod linker;
