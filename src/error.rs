// Copyright (c) 2023 Jonathan "Razordor" Alan Thomason
use std::any::Any;
use std::io;

use thiserror::Error;

/// A list specifying general categories of plugin errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
	/// The OS loader could not open or link the library.
	LoadFailed,
	/// A library handle was asked to load while it already holds a library.
	AlreadyLoaded,
	/// The name has no entry in the manifest.
	NotLoaded,
	/// `unref_obj` was called on an entry with no live objects.
	RefCountUnderflow,
	/// A module contributed by the library failed to initialize.
	ModuleInit,
	/// The library's init function panicked.
	InitPanicked,
	/// No class with the requested name is registered.
	ClassNotFound,
	/// The class is registered but has no constructor.
	NoConstructor,
	/// The manifest was never created, or has been cleared.
	NoManifest,
	/// Closing the OS handle failed.
	CloseFailed,
}

#[derive(Debug, Error)]
pub enum Error {
	#[error("library `{name}` failed to load: {source}")]
	LoadFailed {
		name: String,
		#[source]
		source: io::Error,
	},
	#[error("library handle already holds `{0}`")]
	AlreadyLoaded(String),
	#[error("library `{0}` is not loaded")]
	NotLoaded(String),
	#[error("library `{0}` has no live objects left to release")]
	RefCountUnderflow(String),
	#[error("module `{module}` failed to initialize while loading `{library}`")]
	ModuleInit { library: String, module: String },
	#[error("init function of library `{0}` panicked")]
	InitPanicked(String),
	#[error("class `{0}` is not registered")]
	ClassNotFound(String),
	#[error("class `{0}` cannot be created dynamically")]
	NoConstructor(String),
	#[error("plugin manifest is not available")]
	NoManifest,
	#[error("library `{name}` failed to close: {source}")]
	CloseFailed {
		name: String,
		#[source]
		source: io::Error,
	},
}

impl Error {
	#[inline]
	pub const fn kind(&self) -> ErrorKind {
		match self {
			Self::LoadFailed { .. } => ErrorKind::LoadFailed,
			Self::AlreadyLoaded(_) => ErrorKind::AlreadyLoaded,
			Self::NotLoaded(_) => ErrorKind::NotLoaded,
			Self::RefCountUnderflow(_) => ErrorKind::RefCountUnderflow,
			Self::ModuleInit { .. } => ErrorKind::ModuleInit,
			Self::InitPanicked(_) => ErrorKind::InitPanicked,
			Self::ClassNotFound(_) => ErrorKind::ClassNotFound,
			Self::NoConstructor(_) => ErrorKind::NoConstructor,
			Self::NoManifest => ErrorKind::NoManifest,
			Self::CloseFailed { .. } => ErrorKind::CloseFailed,
		}
	}
}

/// Best effort text of a caught panic.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
	if let Some(msg) = payload.downcast_ref::<&'static str>() {
		msg
	} else if let Some(msg) = payload.downcast_ref::<String>() {
		msg
	} else {
		"Box<dyn Any>"
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn kind_matches_variant() {
		let err = Error::LoadFailed {
			name: "libfoo".to_owned(),
			source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
		};
		assert_eq!(err.kind(), ErrorKind::LoadFailed);
		assert_eq!(
			err.to_string(),
			"library `libfoo` failed to load: no such file"
		);
		assert_eq!(Error::NoManifest.kind(), ErrorKind::NoManifest);
		assert_eq!(
			Error::InitPanicked("libfoo".to_owned()).kind(),
			ErrorKind::InitPanicked
		);
	}

	#[test]
	fn panic_payload_text() {
		let payload = std::panic::catch_unwind(|| panic!("init exploded")).unwrap_err();
		assert_eq!(panic_message(&*payload), "init exploded");
		let payload = std::panic::catch_unwind(|| panic!("{} exploded", "init")).unwrap_err();
		assert_eq!(panic_message(&*payload), "init exploded");
	}
}
