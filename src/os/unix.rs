// Copyright (c) 2023 Jonathan "Razordor" Alan Thomason
use super::Handle;
use crate::load::LoadFlags;
use std::os::unix::ffi::OsStrExt;
use std::{ffi, io, ptr};

#[cfg(not(any(target_os = "linux", target_os = "macos", target_env = "gnu")))]
use std::sync;

// `dlerror` is only thread-local on some platforms.
#[cfg(not(any(target_os = "linux", target_os = "macos", target_env = "gnu")))]
#[inline]
fn dylib_guard<'a>() -> sync::MutexGuard<'a, ()> {
	static LOCK: sync::Mutex<()> = sync::Mutex::new(());
	LOCK.lock().unwrap_or_else(sync::PoisonError::into_inner)
}

#[cfg(any(target_os = "linux", target_os = "macos", target_env = "gnu"))]
#[inline(always)]
fn dylib_guard() {}

unsafe fn dylib_error() -> io::Error {
	let msg = libc::dlerror();
	if msg.is_null() {
		io::Error::new(io::ErrorKind::Other, "unknown dynamic loader error")
	} else {
		let msg = ffi::CStr::from_ptr(msg).to_string_lossy().into_owned();
		io::Error::new(io::ErrorKind::Other, msg)
	}
}

unsafe fn map_result<F>(f: F) -> io::Result<Handle>
where
	F: FnOnce() -> Handle,
{
	let _lock = dylib_guard();
	let _ = libc::dlerror(); // clear existing errors
	let handle = f();
	if handle.is_null() {
		Err(dylib_error())
	} else {
		Ok(handle)
	}
}

#[cfg(any(
	target_os = "linux",
	target_os = "android",
	target_os = "macos",
	target_os = "ios",
	target_os = "freebsd"
))]
const RTLD_NOLOAD: ffi::c_int = libc::RTLD_NOLOAD;
// no way to check without loading, so fall back to a plain open
#[cfg(not(any(
	target_os = "linux",
	target_os = "android",
	target_os = "macos",
	target_os = "ios",
	target_os = "freebsd"
)))]
const RTLD_NOLOAD: ffi::c_int = 0;

fn mode(flags: LoadFlags) -> ffi::c_int {
	let mut mode = if flags.contains(LoadFlags::LAZY) {
		libc::RTLD_LAZY
	} else {
		libc::RTLD_NOW
	};
	mode |= if flags.contains(LoadFlags::GLOBAL) {
		libc::RTLD_GLOBAL
	} else {
		libc::RTLD_LOCAL
	};
	if flags.contains(LoadFlags::GET_LOADED) {
		mode |= RTLD_NOLOAD;
	}
	mode
}

pub(crate) unsafe fn dylib_open(path: &ffi::OsStr, flags: LoadFlags) -> io::Result<Handle> {
	let c_str = ffi::CString::new(path.as_bytes())?;
	map_result(|| libc::dlopen(c_str.as_ptr(), mode(flags)))
}

pub(crate) unsafe fn dylib_this() -> io::Result<Handle> {
	map_result(|| libc::dlopen(ptr::null(), libc::RTLD_NOW))
}

// `RTLD_NOLOAD` still bumps the reference count, so every handle is released.
#[inline]
pub(crate) fn releases_on_close(_flags: LoadFlags) -> bool {
	true
}

pub(crate) unsafe fn dylib_close(lib_handle: Handle) -> io::Result<()> {
	let _lock = dylib_guard();
	let _ = libc::dlerror(); // clear existing errors
	if libc::dlclose(lib_handle) != 0 {
		Err(dylib_error())
	} else {
		Ok(())
	}
}

pub(crate) unsafe fn dylib_symbol(lib_handle: Handle, name: &str) -> *const () {
	let Ok(c_str) = ffi::CString::new(name) else {
		return ptr::null();
	};
	libc::dlsym(lib_handle, c_str.as_ptr()).cast_const().cast()
}
