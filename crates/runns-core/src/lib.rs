//! # runns-core
//!
//! The container instantiation pipeline: runtime-spec model, mount-option
//! parsing, configuration resolution, and rootfs construction. Everything
//! here runs strictly sequentially; within a rootfs build the operation
//! order is a correctness requirement imposed by the kernel, not a
//! performance choice.

pub mod config;
pub mod mountinfo;
pub mod options;
pub mod rootfs;
pub mod spec;
