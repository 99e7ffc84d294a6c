// Copyright (c) 2022 Jonathan "Razordor" Alan Thomason
//! Reference counted plugin libraries.
//!
//! A [`Manifest`] maps library names to loaded plugin libraries. Loading a name that
//! is already loaded shares the library; it is only unmapped once its last link *and*
//! the last object built from its code are gone. While a plugin initializes, the classes
//! and modules it registers are attributed to it, and they are withdrawn again before
//! the library is closed.
#![allow(clippy::missing_safety_doc)]

// lets `dyplug_macro` output name `::dyplug` from inside this crate too
extern crate self as dyplug;

pub mod class;
pub mod dylib;
mod entry;
pub mod error;
pub mod init;
pub mod load;
pub mod manager;
pub mod manifest;
pub mod module;
mod os;
mod sym;

pub use class::{ClassId, ClassInfo, ClassRegistry};
pub use dylib::DynamicLibrary;
pub use entry::{EntryId, EntryState};
pub use init::{PluginInitFn, Registrar, INIT_SYMBOL};
pub use load::{LoadFlags, Loader, System};
pub use manager::PluginManager;
pub use manifest::{
	clear_manifest, create_manifest, load_library, manifest, unload_library, LibraryRef, Manifest,
	Pluggable, UnloadStatus,
};
pub use module::{Module, ModuleId, ModuleRegistry};
pub use sym::Symbol;

/// Exports a function as the plugin's init entry point.
///
/// ```ignore
/// use dyplug::{plugin_init, ClassInfo, Registrar};
///
/// #[plugin_init]
/// fn register(registrar: &mut Registrar<'_>) {
///     registrar.register_class(ClassInfo::new("FooWidget"));
/// }
/// ```
pub use dyplug_macro::plugin_init;

/// The result of a dyplug function
pub type Result<T> = std::result::Result<T, error::Error>;
