// Copyright (c) 2023 Jonathan "Razordor" Alan Thomason
use dyplug::error::ErrorKind;
use dyplug::*;

// The process-wide manifest is shared by every test in this binary, so its whole
// lifecycle is exercised in a single test.
#[test]
fn test_process_manifest_lifecycle() {
	assert_eq!(manifest().unwrap_err().kind(), ErrorKind::NoManifest);
	let err = load_library("libdyplug_does_not_exist", LoadFlags::DEFAULT).unwrap_err();
	assert_eq!(err.kind(), ErrorKind::NoManifest);
	assert!(!unload_library("libdyplug_does_not_exist"));
	assert!(!clear_manifest());

	assert!(create_manifest());
	assert!(!create_manifest());
	let handle = manifest().unwrap();
	assert!(handle.is_open());

	let err = load_library("libdyplug_does_not_exist", LoadFlags::DEFAULT | LoadFlags::QUIET)
		.unwrap_err();
	assert_eq!(err.kind(), ErrorKind::LoadFailed);
	assert!(!unload_library("libdyplug_does_not_exist"));

	#[cfg(target_os = "linux")]
	{
		let lib = load_library("libc.so.6", LoadFlags::DEFAULT).unwrap();
		assert!(lib.has_symbol("atoi"));
		assert!(handle.is_loaded("libc.so.6"));
		assert!(unload_library("libc.so.6"));
		assert!(!unload_library("libc.so.6"));
	}

	assert!(clear_manifest());
	assert!(!clear_manifest());
	assert!(!handle.is_open());
	assert_eq!(manifest().unwrap_err().kind(), ErrorKind::NoManifest);

	// a new manifest can be created after clearing
	assert!(create_manifest());
	assert!(clear_manifest());
}
