// Copyright (c) 2023 Jonathan "Razordor" Alan Thomason
//! The name → library registry.
//!
//! A [`Manifest`] owns every plugin library entry, the class list and the module list
//! behind one lock, so loads, unloads and object tracking are serialized against each
//! other and against the class-list diff taken while a library initializes.
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::{fmt, mem};

use tracing::{debug, error, info, warn};

use crate::class::{ClassId, ClassInfo, ClassRegistry};
use crate::dylib::{canonicalize_name, LibraryCategory};
use crate::entry::{EntryId, EntryState, PluginLibrary};
use crate::error::Error;
use crate::load::{LoadFlags, Loader, System};
use crate::module::ModuleRegistry;
use crate::sym::Symbol;
use crate::Result;

/// What an unload did to the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnloadStatus {
	/// Other links remain; the library stays registered.
	Released,
	/// The last link is gone but objects are alive; the entry outlives its name.
	Orphaned,
	/// The last link and the last object are gone; the library was torn down.
	Destroyed,
}

struct State<L: Loader> {
	names: HashMap<String, EntryId>,
	// includes orphaned entries
	entries: HashMap<EntryId, PluginLibrary<L>>,
	// class record → the entry that registered it
	owners: HashMap<ClassId, EntryId>,
	classes: ClassRegistry,
	modules: ModuleRegistry,
	next_id: u64,
	default_flags: LoadFlags,
}

impl<L: Loader> State<L> {
	fn new(default_flags: LoadFlags) -> Self {
		Self {
			names: HashMap::new(),
			entries: HashMap::new(),
			owners: HashMap::new(),
			classes: ClassRegistry::new(),
			modules: ModuleRegistry::new(),
			next_id: 0,
			default_flags,
		}
	}

	fn entry(&self, id: EntryId) -> Option<&PluginLibrary<L>> {
		self.entries.get(&id)
	}

	fn lookup(&self, name: &str) -> Option<(String, EntryId)> {
		let key = manifest_key(name);
		if let Some(&id) = self.names.get(&key) {
			return Some((key, id));
		}
		let key = manifest_key(&canonicalize_name(name, LibraryCategory::Module));
		self.names.get(&key).map(|&id| (key, id))
	}

	fn load(&mut self, name: &str, flags: LoadFlags) -> Result<(EntryId, String)> {
		let real = if flags.contains(LoadFlags::CANONICAL) {
			canonicalize_name(name, LibraryCategory::Module)
		} else {
			name.to_owned()
		};
		let key = manifest_key(&real);
		if let Some(&id) = self.names.get(&key) {
			if let Some(entry) = self.entries.get_mut(&id) {
				let links = entry.ref_lib().link_count();
				debug!(library = %real, links, "plugin library shared");
				return Ok((id, real));
			}
		}

		let entry = PluginLibrary::<L>::open(&real, flags, &mut self.classes, &mut self.modules)?;
		let id = EntryId(self.next_id);
		self.next_id += 1;
		for class in entry.class_ids(&self.classes) {
			self.owners.insert(class, id);
		}
		self.names.insert(key, id);
		self.entries.insert(id, entry);
		info!(library = %real, "plugin library loaded");
		Ok((id, real))
	}

	fn unref(&mut self, key: String, id: EntryId) -> Result<UnloadStatus> {
		let Some(entry) = self.entries.get_mut(&id) else {
			return Err(Error::NotLoaded(key));
		};
		if !entry.unref_lib() {
			debug!(library = entry.name(), links = entry.link_count(), "plugin library released");
			return Ok(UnloadStatus::Released);
		}
		self.names.remove(&key);
		if entry.obj_count() > 0 {
			info!(
				library = entry.name(),
				objects = entry.obj_count(),
				"plugin library unloaded by name, kept alive for live objects"
			);
			Ok(UnloadStatus::Orphaned)
		} else {
			self.destroy(id);
			Ok(UnloadStatus::Destroyed)
		}
	}

	fn unref_obj(&mut self, id: EntryId, name: &str) -> Result<()> {
		let Some(entry) = self.entries.get_mut(&id) else {
			return Err(Error::NotLoaded(name.to_owned()));
		};
		if entry.unref_obj()? && entry.link_count() == 0 {
			self.destroy(id);
		}
		Ok(())
	}

	fn destroy(&mut self, id: EntryId) {
		if let Some(entry) = self.entries.remove(&id) {
			self.owners.retain(|_, owner| *owner != id);
			info!(library = entry.name(), "plugin library unloaded");
			entry.teardown(&mut self.classes, &mut self.modules);
		}
	}
}

impl<L: Loader> Drop for State<L> {
	fn drop(&mut self) {
		// newest first so dependents go before what they were loaded on top of
		let mut ids: Vec<EntryId> = self.entries.keys().copied().collect();
		ids.sort_unstable_by(|a, b| b.cmp(a));
		for id in ids {
			let Some(entry) = self.entries.remove(&id) else {
				continue;
			};
			if entry.obj_count() > 0 {
				entry.leak();
			} else {
				if entry.is_loaded() {
					warn!(
						library = entry.name(),
						links = entry.link_count(),
						"closing plugin library still loaded at shutdown"
					);
				}
				entry.teardown(&mut self.classes, &mut self.modules);
			}
		}
	}
}

// Library names follow the case rules of the host file system.
#[cfg(windows)]
fn manifest_key(name: &str) -> String {
	name.to_lowercase()
}

#[cfg(not(windows))]
fn manifest_key(name: &str) -> String {
	name.to_owned()
}

/// A process-wide registry of plugin libraries, keyed by name.
///
/// `Manifest` is a cheap handle; clones share the same registry.
pub struct Manifest<L: Loader = System> {
	inner: Arc<Mutex<Option<State<L>>>>,
}

impl<L: Loader> Clone for Manifest<L> {
	#[inline]
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<L: Loader> Default for Manifest<L> {
	#[inline]
	fn default() -> Self {
		Self::new()
	}
}

impl<L: Loader> fmt::Debug for Manifest<L> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let guard = self.lock();
		match guard.as_ref() {
			Some(state) => f
				.debug_struct("Manifest")
				.field("libraries", &state.names.keys().collect::<Vec<_>>())
				.field("entries", &state.entries.len())
				.field("classes", &state.classes.len())
				.field("modules", &state.modules)
				.finish(),
			None => f.write_str("Manifest(cleared)"),
		}
	}
}

impl<L: Loader> Manifest<L> {
	/// Creates an empty manifest.
	#[inline]
	pub fn new() -> Self {
		Self::with_default_flags(LoadFlags::DEFAULT)
	}

	/// Creates an empty manifest whose [`PluginManager::load`](crate::manager::PluginManager::load)
	/// calls use `flags`.
	pub fn with_default_flags(flags: LoadFlags) -> Self {
		Self {
			inner: Arc::new(Mutex::new(Some(State::new(flags)))),
		}
	}

	fn lock(&self) -> MutexGuard<'_, Option<State<L>>> {
		self.inner.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn with_state<R>(&self, f: impl FnOnce(&mut State<L>) -> Result<R>) -> Result<R> {
		let mut guard = self.lock();
		let state = guard.as_mut().ok_or(Error::NoManifest)?;
		f(state)
	}

	/// Returns `false` once [`clear`](Self::clear) has run.
	#[inline]
	pub fn is_open(&self) -> bool {
		self.lock().is_some()
	}

	/// Tears the registry down.
	///
	/// Libraries without live objects are closed, even if links remain. Libraries with
	/// live objects are leaked so their code stays mapped. Every later call on this
	/// manifest fails with [`NoManifest`](crate::error::ErrorKind::NoManifest).
	///
	/// Returns `false` if the manifest was already cleared.
	pub fn clear(&self) -> bool {
		let state = self.lock().take();
		match state {
			Some(state) => {
				// the state runs its teardown on drop; keep that outside the lock
				mem::drop(state);
				true
			}
			None => false,
		}
	}

	pub fn default_flags(&self) -> LoadFlags {
		self.lock()
			.as_ref()
			.map_or(LoadFlags::DEFAULT, |state| state.default_flags)
	}

	/// Loads `name`, or shares it if a library with that name is already loaded.
	///
	/// # Errors
	/// Fails if the OS loader refuses the library or one of its modules fails to
	/// initialize. The registry is left unchanged.
	pub fn load(&self, name: &str, flags: LoadFlags) -> Result<LibraryRef<L>> {
		let (id, real) = self.with_state(|state| state.load(name, flags))?;
		Ok(LibraryRef::new(self.clone(), id, real))
	}

	/// Drops one link to `name`.
	///
	/// The name is removed once its last link is gone. The library itself is torn down
	/// then too, unless objects created from it are still alive.
	///
	/// # Errors
	/// Fails with [`NotLoaded`](crate::error::ErrorKind::NotLoaded) if `name` is not registered.
	pub fn unload(&self, name: &str) -> Result<UnloadStatus> {
		self.with_state(|state| match state.lookup(name) {
			Some((key, id)) => state.unref(key, id),
			None => {
				error!(library = name, "attempt to unload a library that isn't loaded");
				Err(Error::NotLoaded(name.to_owned()))
			}
		})
	}

	/// Drops one link held through `library`.
	///
	/// Unlike [`unload`](Self::unload) this never touches a newer entry that took over the name.
	pub fn release(&self, library: &LibraryRef<L>) -> Result<UnloadStatus> {
		self.with_state(|state| {
			let key = manifest_key(library.name());
			match state.names.get(&key) {
				Some(&id) if id == library.id() => state.unref(key, id),
				_ => {
					error!(library = library.name(), "attempt to release a library that isn't loaded");
					Err(Error::NotLoaded(library.name().to_owned()))
				}
			}
		})
	}

	pub fn is_loaded(&self, name: &str) -> bool {
		self.with_state(|state| Ok(state.lookup(name).is_some()))
			.unwrap_or(false)
	}

	/// Finds the registered library called `name`.
	pub fn library(&self, name: &str) -> Option<LibraryRef<L>> {
		let found = self
			.with_state(|state| {
				Ok(state.lookup(name).and_then(|(_, id)| {
					state.entry(id).map(|entry| (id, entry.name().to_owned()))
				}))
			})
			.ok()
			.flatten()?;
		Some(LibraryRef::new(self.clone(), found.0, found.1))
	}

	/// Names of the registered libraries, sorted.
	pub fn loaded_names(&self) -> Vec<String> {
		let mut names = self
			.with_state(|state| {
				Ok(state
					.names
					.values()
					.filter_map(|id| state.entry(*id))
					.map(|entry| entry.name().to_owned())
					.collect::<Vec<_>>())
			})
			.unwrap_or_default();
		names.sort();
		names
	}

	/// Finds the library that registered `class`.
	pub fn library_for_class(&self, class: &str) -> Option<LibraryRef<L>> {
		let found = self
			.with_state(|state| {
				// the newest record of that name, the one `create_object` would build
				Ok(state
					.classes
					.find(class)
					.and_then(|class| state.owners.get(&class))
					.and_then(|&id| state.entry(id).map(|entry| (id, entry.name().to_owned()))))
			})
			.ok()
			.flatten()?;
		Some(LibraryRef::new(self.clone(), found.0, found.1))
	}

	/// Registers a class that belongs to the host rather than to a plugin.
	pub fn register_class(&self, info: ClassInfo) -> Result<ClassId> {
		self.with_state(|state| Ok(state.classes.register(info)))
	}

	/// Runs `f` against the class list.
	pub fn with_classes<R>(&self, f: impl FnOnce(&ClassRegistry) -> R) -> Result<R> {
		self.with_state(|state| Ok(f(&state.classes)))
	}

	/// Number of modules currently initialized.
	pub fn active_modules(&self) -> Result<usize> {
		self.with_state(|state| Ok(state.modules.active_len()))
	}

	/// Creates an instance of the registered class `class`.
	///
	/// If the class comes from a plugin, the returned object keeps that plugin mapped
	/// until it is dropped.
	pub fn create_object(&self, class: &str) -> Result<Pluggable<L>> {
		let (constructor, owner) = self.with_state(|state| {
			let class_id = state
				.classes
				.find(class)
				.ok_or_else(|| Error::ClassNotFound(class.to_owned()))?;
			let constructor = state
				.classes
				.get(class_id)
				.and_then(ClassInfo::constructor)
				.ok_or_else(|| Error::NoConstructor(class.to_owned()))?;
			let owner = match state.owners.get(&class_id) {
				Some(&owner) => match state.entries.get_mut(&owner) {
					Some(entry) => {
						entry.ref_obj();
						Some((owner, entry.name().to_owned()))
					}
					None => None,
				},
				None => None,
			};
			Ok((constructor, owner))
		})?;
		// the sentinel exists before plugin code runs, so a panicking constructor
		// still releases its object count
		let mut object = Pluggable {
			object: None,
			library: owner.map(|(id, name)| LibraryRef::new(self.clone(), id, name)),
		};
		object.object = Some(constructor());
		Ok(object)
	}
}

/// A non-owning handle to a plugin library entry.
///
/// Holding a `LibraryRef` does not keep the library loaded; it identifies the entry.
/// Two refs compare equal when they name the same entry of the same manifest.
pub struct LibraryRef<L: Loader = System> {
	manifest: Manifest<L>,
	id: EntryId,
	name: Arc<str>,
}

impl<L: Loader> LibraryRef<L> {
	fn new(manifest: Manifest<L>, id: EntryId, name: String) -> Self {
		Self {
			manifest,
			id,
			name: name.into(),
		}
	}

	#[inline]
	pub fn name(&self) -> &str {
		&self.name
	}

	#[inline]
	pub fn id(&self) -> EntryId {
		self.id
	}

	#[inline]
	pub fn manifest(&self) -> &Manifest<L> {
		&self.manifest
	}

	fn read<R>(&self, f: impl FnOnce(&PluginLibrary<L>) -> R) -> Option<R> {
		self.manifest
			.with_state(|state| Ok(state.entry(self.id).map(f)))
			.ok()
			.flatten()
	}

	/// `None` once the entry is destroyed.
	pub fn link_count(&self) -> Option<usize> {
		self.read(PluginLibrary::link_count)
	}

	/// `None` once the entry is destroyed.
	pub fn object_count(&self) -> Option<usize> {
		self.read(PluginLibrary::obj_count)
	}

	pub fn state(&self) -> EntryState {
		self.read(PluginLibrary::state)
			.unwrap_or(EntryState::Destroyed)
	}

	#[inline]
	pub fn is_loaded(&self) -> bool {
		self.read(PluginLibrary::is_loaded).unwrap_or(false)
	}

	/// Resolves `name` in the library.
	///
	/// The address is only valid while the library stays loaded.
	pub fn symbol(&self, name: &str) -> Option<Symbol<'_>> {
		let addr = self
			.read(|entry| entry.library().symbol(name).map(Symbol::as_ptr))
			.flatten()?;
		Symbol::from_ptr(addr)
	}

	#[inline]
	pub fn has_symbol(&self, name: &str) -> bool {
		self.symbol(name).is_some()
	}

	/// Records one more live object built from this library's code.
	pub fn ref_obj(&self) -> Result<()> {
		self.manifest.with_state(|state| match state.entries.get_mut(&self.id) {
			Some(entry) => {
				entry.ref_obj();
				Ok(())
			}
			None => Err(Error::NotLoaded(self.name.to_string())),
		})
	}

	/// Records that one object built from this library's code is gone.
	///
	/// An orphaned library is torn down when its last object goes.
	///
	/// # Errors
	/// Releasing more objects than were recorded is a bug in the caller: it asserts in
	/// debug builds and returns [`RefCountUnderflow`](crate::error::ErrorKind::RefCountUnderflow)
	/// otherwise, leaving the count at zero.
	pub fn unref_obj(&self) -> Result<()> {
		let result = self
			.manifest
			.with_state(|state| state.unref_obj(self.id, &self.name));
		if let Err(Error::RefCountUnderflow(name)) = &result {
			debug_assert!(false, "too many objects of `{name}` released");
		}
		result
	}

	/// Returns a sentinel counting as one live object until dropped.
	pub fn track(&self) -> Result<Pluggable<L>> {
		self.ref_obj()?;
		Ok(Pluggable {
			object: None,
			library: Some(self.clone()),
		})
	}
}

impl<L: Loader> Clone for LibraryRef<L> {
	fn clone(&self) -> Self {
		Self {
			manifest: self.manifest.clone(),
			id: self.id,
			name: Arc::clone(&self.name),
		}
	}
}

impl<L: Loader> PartialEq for LibraryRef<L> {
	fn eq(&self, other: &Self) -> bool {
		self.id == other.id && Arc::ptr_eq(&self.manifest.inner, &other.manifest.inner)
	}
}

impl<L: Loader> Eq for LibraryRef<L> {}

impl<L: Loader> fmt::Debug for LibraryRef<L> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("LibraryRef")
			.field("name", &self.name)
			.field("id", &self.id)
			.finish()
	}
}

/// An object whose code may live in a plugin library.
///
/// While it exists the library counts one more live object, so it is not unmapped
/// under the object. The wrapped object is dropped before the count is released.
pub struct Pluggable<L: Loader = System> {
	object: Option<Box<dyn Any + Send>>,
	library: Option<LibraryRef<L>>,
}

impl<L: Loader> Pluggable<L> {
	/// The library the object came from, `None` for host classes.
	#[inline]
	pub fn library(&self) -> Option<&LibraryRef<L>> {
		self.library.as_ref()
	}

	#[inline]
	pub fn object(&self) -> Option<&(dyn Any + Send)> {
		self.object.as_deref()
	}

	#[inline]
	pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
		self.object.as_ref()?.downcast_ref()
	}

	#[inline]
	pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
		self.object.as_mut()?.downcast_mut()
	}
}

impl<L: Loader> fmt::Debug for Pluggable<L> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Pluggable")
			.field("library", &self.library)
			.field("has_object", &self.object.is_some())
			.finish()
	}
}

impl<L: Loader> Drop for Pluggable<L> {
	fn drop(&mut self) {
		mem::drop(self.object.take());
		if let Some(library) = self.library.take() {
			match library.unref_obj() {
				Ok(()) => {}
				// the library was leaked when the manifest was cleared
				Err(Error::NoManifest) => {
					debug!(library = library.name(), "object outlived its manifest");
				}
				Err(err) => error!(library = library.name(), error = %err, "failed to release object"),
			}
		}
	}
}

static MANIFEST: Mutex<Option<Manifest>> = Mutex::new(None);

fn global() -> MutexGuard<'static, Option<Manifest>> {
	MANIFEST.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Creates the process-wide manifest. Returns `false` if it already exists.
pub fn create_manifest() -> bool {
	let mut global = global();
	if global.is_some() {
		return false;
	}
	*global = Some(Manifest::new());
	true
}

/// Tears down the process-wide manifest. Returns `false` if there was none.
pub fn clear_manifest() -> bool {
	let manifest = global().take();
	manifest.map_or(false, |manifest| manifest.clear())
}

/// The process-wide manifest.
///
/// # Errors
/// Fails with [`NoManifest`](crate::error::ErrorKind::NoManifest) outside
/// [`create_manifest`]/[`clear_manifest`].
pub fn manifest() -> Result<Manifest> {
	global().clone().ok_or(Error::NoManifest)
}

/// Loads `name` through the process-wide manifest.
pub fn load_library(name: &str, flags: LoadFlags) -> Result<LibraryRef> {
	manifest()?.load(name, flags)
}

/// Unloads `name` through the process-wide manifest.
///
/// Returns `false` if there is no manifest or `name` is not loaded.
pub fn unload_library(name: &str) -> bool {
	match manifest() {
		Ok(manifest) => manifest.unload(name).is_ok(),
		Err(err) => {
			error!(library = name, error = %err, "cannot unload library");
			false
		}
	}
}
