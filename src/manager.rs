// Copyright (c) 2023 Jonathan "Razordor" Alan Thomason
use tracing::warn;

use crate::error::Error;
use crate::load::{LoadFlags, Loader, System};
use crate::manifest::{LibraryRef, Manifest, UnloadStatus};
use crate::sym::Symbol;
use crate::Result;

/// Holds at most one link to a plugin library of a [`Manifest`].
///
/// The link is released when the manager is dropped, so a manager can be used to scope
/// a plugin's lifetime while the library itself stays shared through the manifest.
///
/// # Examples
///
/// ```no_run
/// use dyplug::{LoadFlags, Manifest, PluginManager};
///
/// let manifest: Manifest = Manifest::new();
/// let plugin = PluginManager::with_library(&manifest, "libfoo.so", LoadFlags::DEFAULT).unwrap();
/// assert!(plugin.is_loaded());
/// drop(plugin);
/// assert!(!manifest.is_loaded("libfoo.so"));
/// ```
pub struct PluginManager<L: Loader = System> {
	manifest: Manifest<L>,
	entry: Option<LibraryRef<L>>,
}

impl<L: Loader> PluginManager<L> {
	#[inline]
	pub fn new(manifest: &Manifest<L>) -> Self {
		Self {
			manifest: manifest.clone(),
			entry: None,
		}
	}

	/// Constructs a manager already holding a link to `name`.
	pub fn with_library(manifest: &Manifest<L>, name: &str, flags: LoadFlags) -> Result<Self> {
		let mut manager = Self::new(manifest);
		manager.load_with(name, flags)?;
		Ok(manager)
	}

	/// Loads `name` with the manifest's default flags.
	pub fn load(&mut self, name: &str) -> Result<&LibraryRef<L>> {
		let flags = self.manifest.default_flags();
		self.load_with(name, flags)
	}

	/// Loads `name`, releasing the link held so far.
	///
	/// # Errors
	/// If loading fails the manager ends up empty.
	pub fn load_with(&mut self, name: &str, flags: LoadFlags) -> Result<&LibraryRef<L>> {
		if self.entry.is_some() {
			self.unload()?;
		}
		let entry = self.manifest.load(name, flags)?;
		Ok(self.entry.insert(entry))
	}

	/// Releases the held link.
	///
	/// # Errors
	/// Fails with [`NotLoaded`](crate::error::ErrorKind::NotLoaded) if nothing is held.
	pub fn unload(&mut self) -> Result<UnloadStatus> {
		match self.entry.take() {
			Some(entry) => self.manifest.release(&entry),
			None => Err(Error::NotLoaded(String::new())),
		}
	}

	#[inline]
	pub fn is_loaded(&self) -> bool {
		self.entry.as_ref().map_or(false, LibraryRef::is_loaded)
	}

	#[inline]
	pub fn library(&self) -> Option<&LibraryRef<L>> {
		self.entry.as_ref()
	}

	pub fn symbol(&self, name: &str) -> Option<Symbol<'_>> {
		self.entry.as_ref()?.symbol(name)
	}

	#[inline]
	pub fn has_symbol(&self, name: &str) -> bool {
		self.symbol(name).is_some()
	}
}

impl<L: Loader> Drop for PluginManager<L> {
	fn drop(&mut self) {
		if let Some(name) = self.entry.as_ref().map(|entry| entry.name().to_owned()) {
			if let Err(err) = self.unload() {
				warn!(library = %name, error = %err, "failed to release plugin library");
			}
		}
	}
}
