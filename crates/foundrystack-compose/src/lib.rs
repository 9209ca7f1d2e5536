//! # foundrystack-compose
//!
//! Composes the Foundry deployment into independently deployable stacks.
//!
//! Handles:
//! - **Resolver**: Normalizes raw inputs into one validated configuration.
//! - **Shared**: Network, reserved address and asset bucket in their own stack.
//! - **Storage / Compute**: Mutually exclusive strategies selected by the configuration.
//! - **Wiring**: Permissions, connectivity and ingress between the chosen strategies.
//! - **Graph**: Stack ordering and cross-stack import checks.
//! - **Assembly**: Rendering templates and the manifest to disk.

pub mod assembly;
pub mod composer;
pub mod compute;
pub mod container;
pub mod graph;
pub mod intrinsic;
pub mod resolver;
pub mod shared;
pub mod stack;
pub mod storage;
pub mod template;
pub mod wiring;

pub use assembly::{CloudAssembly, TemplateFormat};
pub use composer::{Composer, compose};
