//! Boundary error type. Internal CPU opcode errors stay as the `String`-keyed
//! `CpuResult` the core already used; this type is what the host-facing API
//! (`load_rom`, `save_state`/`load_state`) actually returns.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid ROM: {0}")]
    InvalidRom(String),

    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    #[error("save state corrupted: {0}")]
    StateCorruption(String),

    #[error("cpu execution fault: {0}")]
    ExecutionFault(String),
}
