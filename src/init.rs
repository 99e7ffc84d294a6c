// Copyright (c) 2023 Jonathan "Razordor" Alan Thomason
//! Registration performed by a plugin while it is being loaded.
//!
//! A plugin exports [`INIT_SYMBOL`], usually through [`plugin_init`](crate::plugin_init).
//! The host calls it once, right after the OS loader maps the library, and
//! everything registered through the [`Registrar`] is attributed to that library.
use crate::class::{ClassId, ClassInfo, ClassRegistry};
use crate::module::{Module, ModuleRegistry};

/// Name of the symbol resolved after a plugin is opened.
pub const INIT_SYMBOL: &str = "__dyplug_static_init";

/// Signature of the function exported as [`INIT_SYMBOL`].
pub type PluginInitFn = unsafe fn(&mut Registrar<'_>);

/// Handed to a plugin's init function to record what it contributes.
pub struct Registrar<'a> {
	classes: &'a mut ClassRegistry,
	modules: &'a mut ModuleRegistry,
}

impl<'a> Registrar<'a> {
	#[inline]
	pub(crate) fn new(classes: &'a mut ClassRegistry, modules: &'a mut ModuleRegistry) -> Self {
		Self { classes, modules }
	}

	#[inline]
	pub fn register_class(&mut self, info: ClassInfo) -> ClassId {
		self.classes.register(info)
	}

	/// Queues `module`; it is started once the init function returns.
	#[inline]
	pub fn register_module<M: Module + 'static>(&mut self, module: M) {
		self.modules.register(Box::new(module));
	}
}
