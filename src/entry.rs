// Copyright (c) 2023 Jonathan "Razordor" Alan Thomason
use std::mem;
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, error, warn};

use crate::class::{ClassId, ClassRegistry};
use crate::dylib::DynamicLibrary;
use crate::error::{panic_message, Error};
use crate::init::{PluginInitFn, Registrar, INIT_SYMBOL};
use crate::load::{LoadFlags, Loader};
use crate::module::{ModuleId, ModuleRegistry};
use crate::Result;

/// Identity of a plugin library entry. Ids are never reused within a manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(pub(crate) u64);

/// Lifecycle of a plugin library entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
	/// At least one link is outstanding.
	Active,
	/// Unloaded by name but kept mapped for live objects.
	Orphaned,
	/// Torn down; the library is no longer mapped through this entry.
	Destroyed,
}

#[derive(Debug, Clone, Copy)]
struct ClassRange {
	first: ClassId,
	last: ClassId,
	count: usize,
}

/// One loaded library and everything it contributed to the process.
///
/// Only the manifest touches entries, always while holding its lock.
pub(crate) struct PluginLibrary<L: Loader> {
	name: String,
	lib: DynamicLibrary<L>,
	link_count: usize,
	obj_count: usize,
	classes: Option<ClassRange>,
	modules: Vec<ModuleId>,
}

impl<L: Loader> PluginLibrary<L> {
	/// Opens `name`, runs its init function and starts the modules it queued.
	///
	/// Either everything succeeds or nothing stays registered and the handle is closed.
	pub(crate) fn open(
		name: &str,
		flags: LoadFlags,
		classes: &mut ClassRegistry,
		modules: &mut ModuleRegistry,
	) -> Result<Self> {
		let mut lib = DynamicLibrary::<L>::open(name, flags)?;
		// SAFETY: plugins export `INIT_SYMBOL` with the `PluginInitFn` signature.
		let init = lib
			.symbol(INIT_SYMBOL)
			.map(|sym| unsafe { mem::transmute::<*const (), PluginInitFn>(sym.as_ptr()) });

		let before = classes.head();
		// a panicking plugin must not unwind through the manifest lock
		let panicked = init.and_then(|init| {
			panic::catch_unwind(AssertUnwindSafe(|| unsafe {
				init(&mut Registrar::new(&mut *classes, &mut *modules))
			}))
			.err()
		});
		let range = classes
			.added_since(before)
			.map(|(first, last, count)| ClassRange { first, last, count });

		let started = match panicked {
			Some(payload) => {
				error!(
					library = name,
					panic = panic_message(&*payload),
					"plugin init function panicked"
				);
				modules.discard_pending();
				Err(Error::InitPanicked(name.to_owned()))
			}
			None => modules.init_pending().map_err(|module| Error::ModuleInit {
				library: name.to_owned(),
				module,
			}),
		};
		let started = match started {
			Ok(started) => started,
			Err(err) => {
				if let Some(range) = range {
					classes.remove_range(range.first, range.last);
				}
				if let Err(close) = lib.unload() {
					warn!(library = name, error = %close, "failed to close library");
				}
				return Err(err);
			}
		};

		debug!(
			library = name,
			classes = range.map_or(0, |range| range.count),
			modules = started.len(),
			"plugin library initialized"
		);
		Ok(Self {
			name: name.to_owned(),
			lib,
			link_count: 1,
			obj_count: 0,
			classes: range,
			modules: started,
		})
	}

	#[inline]
	pub(crate) fn name(&self) -> &str {
		&self.name
	}

	#[inline]
	pub(crate) fn library(&self) -> &DynamicLibrary<L> {
		&self.lib
	}

	#[inline]
	pub(crate) fn link_count(&self) -> usize {
		self.link_count
	}

	#[inline]
	pub(crate) fn obj_count(&self) -> usize {
		self.obj_count
	}

	#[inline]
	pub(crate) fn is_loaded(&self) -> bool {
		self.link_count > 0
	}

	pub(crate) fn state(&self) -> EntryState {
		match (self.link_count, self.obj_count) {
			(0, 0) => EntryState::Destroyed,
			(0, _) => EntryState::Orphaned,
			_ => EntryState::Active,
		}
	}

	/// The classes this library registered, newest first.
	pub(crate) fn class_ids(&self, classes: &ClassRegistry) -> Vec<ClassId> {
		let Some(range) = self.classes else {
			return Vec::new();
		};
		let mut ids = Vec::with_capacity(range.count);
		let mut cur = Some(range.first);
		while let Some(id) = cur {
			ids.push(id);
			if id == range.last {
				break;
			}
			cur = classes.next(id);
		}
		ids
	}

	#[inline]
	pub(crate) fn ref_lib(&mut self) -> &mut Self {
		self.link_count += 1;
		self
	}

	/// Drops one link, returning `true` once none are left.
	pub(crate) fn unref_lib(&mut self) -> bool {
		if self.link_count == 0 {
			error!(library = %self.name, "link count underflow");
			return true;
		}
		self.link_count -= 1;
		self.link_count == 0
	}

	#[inline]
	pub(crate) fn ref_obj(&mut self) {
		self.obj_count += 1;
	}

	/// Drops one live object, returning `true` once none are left.
	///
	/// # Errors
	/// Fails without changing the count if no objects are live.
	pub(crate) fn unref_obj(&mut self) -> Result<bool> {
		if self.obj_count == 0 {
			error!(library = %self.name, "object count underflow, too many objects released");
			return Err(Error::RefCountUnderflow(self.name.clone()));
		}
		self.obj_count -= 1;
		Ok(self.obj_count == 0)
	}

	/// Stops this library's modules, unlinks its classes and closes the handle, in that order.
	pub(crate) fn teardown(mut self, classes: &mut ClassRegistry, modules: &mut ModuleRegistry) {
		modules.cleanup(&self.modules);
		if let Some(range) = self.classes.take() {
			if classes.remove_range(range.first, range.last) != Some(range.count) {
				error!(library = %self.name, "class records of library are no longer contiguous");
			}
		}
		if let Err(err) = self.lib.unload() {
			warn!(library = %self.name, error = %err, "failed to close library");
		}
		debug!(library = %self.name, "plugin library destroyed");
	}

	/// Keeps the library mapped for the rest of the process.
	///
	/// Modules and classes stay registered since code from the library may still run.
	pub(crate) fn leak(mut self) {
		warn!(
			library = %self.name,
			objects = self.obj_count,
			"leaking plugin library with live objects"
		);
		mem::forget(self.lib.detach());
	}
}
