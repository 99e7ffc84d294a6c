// Copyright (c) 2023 Jonathan "Razordor" Alan Thomason

use std::ffi::OsStr;
use std::io;

mod sys;

bitflags::bitflags! {
	/// Options passed to the OS loader when a library is opened.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
	pub struct LoadFlags: u32 {
		/// Resolve symbols when they are first used.
		const LAZY = 0x0001;
		/// Resolve every symbol before `open` returns.
		const NOW = 0x0002;
		/// Make the library's symbols available to libraries loaded afterwards.
		const GLOBAL = 0x0004;
		/// Keep the library's symbols private to it.
		const LOCAL = 0x0008;
		/// Windows only: search the application directory and the default system paths.
		const SEARCH_DEFAULT_DIRS = 0x0010;
		/// Only reuse a library that is already mapped into the process.
		///
		/// On Windows the OS reference count is left untouched, and the handle is
		/// not released when unloaded.
		const GET_LOADED = 0x0020;
		/// Canonicalize plugin names by appending the platform extension if missing.
		const CANONICAL = 0x0040;
		/// Report load failures at debug level instead of warning.
		const QUIET = 0x0080;
	}
}

impl LoadFlags {
	pub const DEFAULT: Self = Self::NOW.union(Self::LOCAL).union(Self::SEARCH_DEFAULT_DIRS);
}

impl Default for LoadFlags {
	#[inline]
	fn default() -> Self {
		Self::DEFAULT
	}
}

/// Used to specify the run-time linker loader for [`DynamicLibrary`](crate::dylib::DynamicLibrary)
/// and [`Manifest`](crate::manifest::Manifest).
/// `Loader` can also be used to make custom loaders.
///
/// # Safety
/// `symbol` must only return addresses that stay valid until `close` is called.
pub unsafe trait Loader: Send + Sized {
	/// Attempts to open a shared library.
	///
	/// Returns `Ok` if success, otherwise `Err`.
	unsafe fn open(path: &OsStr, flags: LoadFlags) -> io::Result<Self>;
	/// Opens the executable image of the running program.
	unsafe fn this() -> io::Result<Self>;
	/// Retrieves raw symbol from shared library.
	///
	/// If successful, returns a valid address to symbol, otherwise
	/// returns a `null` pointer.
	unsafe fn symbol(&self, name: &str) -> *const ();
	/// Releases the handle. When the OS reference count hits zero the library is unmapped.
	unsafe fn close(self) -> io::Result<()>;
}

/// An object providing access to an open shared library on the filesystem.
///
/// This is the library loader primitive used by default throughout the crate.
#[derive(Debug)]
pub struct System {
	handle: crate::os::Handle,
	owned: bool,
}
