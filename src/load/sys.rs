// Copyright (c) 2023 Jonathan "Razordor" Alan Thomason

use super::*;
use crate::os::imp;

// internal type is opaque and managed by OS, so it's `Send` safe
unsafe impl Send for System {}

unsafe impl Loader for System {
	/// If successful, increments reference count to shared library handle, and constructs `System`.
	unsafe fn open(path: &OsStr, flags: LoadFlags) -> io::Result<Self> {
		let handle = imp::dylib_open(path, flags)?;
		Ok(Self {
			handle,
			owned: imp::releases_on_close(flags),
		})
	}

	unsafe fn this() -> io::Result<Self> {
		let handle = imp::dylib_this()?;
		Ok(Self {
			handle,
			owned: true,
		})
	}

	unsafe fn symbol(&self, name: &str) -> *const () {
		imp::dylib_symbol(self.handle, name)
	}

	/// Decrements reference counter to shared library. When reference counter hits zero the library is unloaded.
	/// # Errors
	/// May error depending on system call.
	unsafe fn close(self) -> io::Result<()> {
		if self.owned {
			imp::dylib_close(self.handle)
		} else {
			Ok(())
		}
	}
}
