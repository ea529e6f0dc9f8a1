//! Sandbox module - isolated execution environments
//!
//! This module provides the container side of the harness:
//! - Host command execution behind the `CommandExecutor` trait
//! - Container CLI wrapper and image recipes
//! - The `Environment` lifecycle (ensure image, start, copy in, exec, stop)
//!
//! The sandbox module does NOT:
//! - Know the framed result protocol (that's the runner's job)
//! - Interpret outputs or assign verdicts

pub mod cli;
pub mod container;
pub mod executor;
pub mod image;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use cli::ContainerCli;
pub use container::{Environment, EnvironmentLimits, InstanceState, HELPER_DIR};
pub use executor::{exit_code_of, CommandExecutor, CommandOutput, CommandSpec, HostExecutor};
pub use image::{image_exists, ImageRecipe};
