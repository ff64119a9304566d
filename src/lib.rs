//! # Voxel Script
//!
//! Metadata-driven bindings that expose native voxel editor object graphs to an
//! embedded QuickJS runtime.
//!
//! ## Architecture
//!
//! - **Descriptors**: static class and attribute tables describing what a native type exposes
//! - **Dispatcher**: one generic getter/setter pair, resolving the attribute from an integer tag
//! - **Registrar**: wires descriptors into a live engine (prototypes, constructors, properties)
//! - **Host**: the script host state machine, console glue and the file runner
//!
//! ### Example
//!
//! ```ignore
//! use voxel_script::config::ScriptConfig;
//! use voxel_script::host::Goxel;
//! use voxel_script::scripting::run_script;
//!
//! let mut goxel = Goxel::new();
//! let status = run_script("scene.js", &mut goxel, &ScriptConfig::default());
//! std::process::exit(status.exit_code());
//! ```
//!
//! ## Modules
//!
//! - [`core`]: error types, logging and shared macros
//! - [`config`]: configuration loading
//! - [`bindings`]: descriptor model, dispatcher, collections and registrar
//! - [`host`]: the voxel editor data model exposed to scripts
//! - [`scripting`]: script host and execution entry

/// Error types, logging and shared macros
#[macro_use]
pub mod core;
/// Configuration system
pub mod config;
/// Native object bindings for the script runtime
pub mod bindings;
/// Voxel editor data model exposed to scripts
pub mod host;
/// Script host and execution entry
pub mod scripting;

pub use bindings::{
    Attribute, AttributeKind, ClassDescriptor, ClassId, DList, Link, Linked, NativeClass,
    NativeHandle, Scalar,
};
pub use config::ScriptConfig;
pub use core::{BindingError, BindingResult, ScriptError, ScriptResult};
pub use scripting::{run_script, Evaluation, HostStage, RunStatus, ScriptHost};
