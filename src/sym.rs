// Copyright (c) 2023 Jonathan "Razordor" Alan Thomason
use std::marker;

/// The address of a symbol resolved from a loaded library.
///
/// The lifetime ties the address to the handle it came from; it must not be used
/// after the library is unloaded.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(transparent)]
pub struct Symbol<'a>(*const (), marker::PhantomData<&'a ()>);

impl<'a> Symbol<'a> {
	#[inline]
	pub(crate) fn from_ptr(addr: *const ()) -> Option<Self> {
		if addr.is_null() {
			None
		} else {
			Some(Self(addr, marker::PhantomData))
		}
	}
	/// Casts to a pointer of another type.
	#[inline]
	pub const fn cast<T>(self) -> *const T {
		self.0.cast()
	}
	#[inline]
	pub const fn as_ptr(self) -> *const () {
		self.0
	}
}
