// Copyright (c) 2023 Jonathan "Razordor" Alan Thomason
use std::os::windows::ffi::OsStrExt;
use std::{ffi, io, ptr};

use super::Handle;
use crate::load::LoadFlags;

mod c;

fn to_wide(path: &ffi::OsStr) -> Vec<u16> {
	path.encode_wide().chain(std::iter::once(0u16)).collect()
}

pub(crate) unsafe fn dylib_open(path: &ffi::OsStr, flags: LoadFlags) -> io::Result<Handle> {
	let wide_str: Vec<u16> = to_wide(path);
	let handle = if flags.contains(LoadFlags::GET_LOADED) {
		let mut handle: c::HMODULE = ptr::null_mut();
		let result = c::GetModuleHandleExW(
			c::GET_MODULE_HANDLE_EX_FLAG_UNCHANGED_REFCOUNT,
			wide_str.as_ptr(),
			&mut handle,
		);
		if result == 0 {
			ptr::null_mut()
		} else {
			handle
		}
	} else {
		let dwflags = if flags.contains(LoadFlags::SEARCH_DEFAULT_DIRS) {
			c::LOAD_LIBRARY_SEARCH_DEFAULT_DIRS
		} else {
			0
		};
		c::LoadLibraryExW(wide_str.as_ptr(), ptr::null_mut(), dwflags)
	};
	if handle.is_null() {
		Err(io::Error::last_os_error())
	} else {
		Ok(handle)
	}
}

#[inline]
pub(crate) unsafe fn dylib_this() -> io::Result<Handle> {
	let mut handle: c::HMODULE = ptr::null_mut();
	let result = c::GetModuleHandleExW(0, ptr::null(), &mut handle);
	if result == 0 {
		Err(io::Error::last_os_error())
	} else {
		Ok(handle)
	}
}

// A handle borrowed with an unchanged refcount must not be freed.
#[inline]
pub(crate) fn releases_on_close(flags: LoadFlags) -> bool {
	!flags.contains(LoadFlags::GET_LOADED)
}

#[inline]
pub(crate) unsafe fn dylib_close(lib_handle: Handle) -> io::Result<()> {
	if c::FreeLibrary(lib_handle) == 0 {
		Err(io::Error::last_os_error())
	} else {
		Ok(())
	}
}

#[inline]
pub(crate) unsafe fn dylib_symbol(lib_handle: Handle, name: &str) -> *const () {
	let Ok(c_str) = ffi::CString::new(name) else {
		return ptr::null();
	};
	c::GetProcAddress(lib_handle, c_str.as_ptr()).cast()
}
