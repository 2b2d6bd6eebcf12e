// MIT License - Copyright (c) 2026 Peter Wright
// Zone and partition records

pub mod zone;
pub mod partition;

pub use zone::Zone;
pub use partition::{ArmingState, Partition};
