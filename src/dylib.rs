// Copyright (c) 2023 Jonathan "Razordor" Alan Thomason
use std::ffi::OsStr;
use std::{fmt, io};

use tracing::{debug, warn};

use crate::error::Error;
use crate::load::{LoadFlags, Loader, System};
use crate::sym::Symbol;
use crate::Result;

/// Which naming convention [`canonicalize_name`] applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryCategory {
	/// A shared library meant to be linked against (`libfoo.so`).
	Library,
	/// A loadable module or plugin (`foo.so`).
	Module,
}

/// Returns the file extension of shared libraries on this platform, including the dot.
#[inline]
pub const fn dll_ext() -> &'static str {
	if cfg!(windows) {
		".dll"
	} else if cfg!(target_os = "macos") {
		".dylib"
	} else {
		".so"
	}
}

// Windows file names are case-insensitive, so `FOO.DLL` already has its extension.
fn has_dll_ext(name: &str) -> bool {
	if cfg!(windows) {
		name.to_ascii_lowercase().ends_with(dll_ext())
	} else {
		name.ends_with(dll_ext())
	}
}

/// Turns a base name into the file name the platform uses for it.
///
/// On unix the `lib` prefix is added to [`LibraryCategory::Library`] names. The
/// extension is appended unless the name already ends with it.
pub fn canonicalize_name(name: &str, category: LibraryCategory) -> String {
	let mut canonical = String::with_capacity(name.len() + 8);
	if cfg!(unix) && category == LibraryCategory::Library && !name.starts_with("lib") {
		canonical.push_str("lib");
	}
	canonical.push_str(name);
	if !has_dll_ext(name) {
		canonical.push_str(dll_ext());
	}
	canonical
}

/// An object owning at most one OS library handle.
///
/// The handle is released when the object is dropped.
pub struct DynamicLibrary<L: Loader = System> {
	name: String,
	hlib: Option<L>,
}

impl<L: Loader> DynamicLibrary<L> {
	/// Constructs an unloaded `DynamicLibrary`.
	#[inline]
	pub const fn new() -> Self {
		Self {
			name: String::new(),
			hlib: None,
		}
	}

	/// Opens `path`, returning a loaded handle.
	///
	/// # Errors
	/// Fails if the OS loader cannot open or link the library.
	pub fn open<P: AsRef<OsStr>>(path: P, flags: LoadFlags) -> Result<Self> {
		let mut lib = Self::new();
		lib.load(path, flags)?;
		Ok(lib)
	}

	/// Opens the executable image of the running program.
	pub fn this() -> Result<Self> {
		match unsafe { L::this() } {
			Ok(handle) => Ok(Self {
				name: String::from("<this>"),
				hlib: Some(handle),
			}),
			Err(source) => Err(Error::LoadFailed {
				name: String::from("<this>"),
				source,
			}),
		}
	}

	/// Loads `path` into this handle.
	///
	/// # Errors
	/// Fails with [`AlreadyLoaded`](crate::error::ErrorKind::AlreadyLoaded) if a library is
	/// already held; the held library stays loaded. Fails with
	/// [`LoadFailed`](crate::error::ErrorKind::LoadFailed) if the OS refuses it, in which case
	/// the handle stays unloaded.
	pub fn load<P: AsRef<OsStr>>(&mut self, path: P, flags: LoadFlags) -> Result<()> {
		let path = path.as_ref();
		let name = path.to_string_lossy().into_owned();
		if self.hlib.is_some() {
			return Err(Error::AlreadyLoaded(self.name.clone()));
		}
		let result = if path.is_empty() {
			Err(io::Error::new(
				io::ErrorKind::InvalidInput,
				"library name is empty",
			))
		} else {
			unsafe { L::open(path, flags) }
		};
		match result {
			Ok(handle) => {
				debug!(library = %name, ?flags, "opened library");
				self.hlib = Some(handle);
				self.name = name;
				Ok(())
			}
			Err(source) => {
				if flags.contains(LoadFlags::QUIET) {
					debug!(library = %name, error = %source, "failed to load library");
				} else {
					warn!(library = %name, error = %source, "failed to load library");
				}
				Err(Error::LoadFailed { name, source })
			}
		}
	}

	#[inline]
	pub fn is_loaded(&self) -> bool {
		self.hlib.is_some()
	}

	/// The name the library was loaded with, empty while unloaded.
	#[inline]
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Resolves `name`, returning `None` if unloaded or if the symbol is absent.
	pub fn symbol(&self, name: &str) -> Option<Symbol<'_>> {
		let handle = self.hlib.as_ref()?;
		Symbol::from_ptr(unsafe { handle.symbol(name) })
	}

	#[inline]
	pub fn has_symbol(&self, name: &str) -> bool {
		self.symbol(name).is_some()
	}

	/// Releases the OS handle. Unloading an unloaded handle does nothing.
	///
	/// # Errors
	/// May error depending on system call; the handle is released either way.
	pub fn unload(&mut self) -> Result<()> {
		let Some(handle) = self.hlib.take() else {
			return Ok(());
		};
		match unsafe { handle.close() } {
			Ok(()) => {
				debug!(library = %self.name, "closed library");
				Ok(())
			}
			Err(source) => Err(Error::CloseFailed {
				name: self.name.clone(),
				source,
			}),
		}
	}

	/// Gives up ownership of the OS handle without closing it.
	///
	/// The library stays mapped for the rest of the process unless the returned
	/// loader is closed.
	#[inline]
	pub fn detach(&mut self) -> Option<L> {
		self.hlib.take()
	}
}

impl<L: Loader> Default for DynamicLibrary<L> {
	#[inline]
	fn default() -> Self {
		Self::new()
	}
}

impl<L: Loader> fmt::Debug for DynamicLibrary<L> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DynamicLibrary")
			.field("name", &self.name)
			.field("loaded", &self.is_loaded())
			.finish()
	}
}

impl<L: Loader> Drop for DynamicLibrary<L> {
	fn drop(&mut self) {
		if let Err(err) = self.unload() {
			warn!(library = %self.name, error = %err, "failed to close library");
		}
	}
}
