// Copyright (c) 2023 Jonathan "Razordor" Alan Thomason
mod common;

use common::*;
use dyplug::*;

#[plugin_init]
fn register(registrar: &mut Registrar<'_>) {
	registrar.register_class(ClassInfo::new("MacroWidget").with_base("Object"));
	registrar.register_module(Recorder::new("macro"));
}

#[test]
fn test_exported_entry_point() {
	let manifest = new_manifest();
	let init: PluginInitFn = __dyplug_static_init;
	define_plugin("libmacro", init);

	let lib = manifest.load("libmacro", LoadFlags::DEFAULT).unwrap();
	assert_eq!(class_names(&manifest), ["MacroWidget"]);
	assert_eq!(manifest.library_for_class("MacroWidget"), Some(lib));
	assert_eq!(take_events(), ["open libmacro", "init macro"]);

	assert_eq!(manifest.unload("libmacro").unwrap(), UnloadStatus::Destroyed);
	assert_eq!(take_events(), ["exit macro", "close libmacro"]);
	assert!(class_names(&manifest).is_empty());
}

#[test]
fn test_annotated_function_is_kept() {
	let manifest = new_manifest();
	define_plugin("libdirect", register);
	manifest.load("libdirect", LoadFlags::DEFAULT).unwrap();
	assert!(manifest
		.with_classes(|classes| classes.find("MacroWidget").is_some())
		.unwrap());
	assert_eq!(manifest.active_modules().unwrap(), 1);
}

mod renamed {
	use dyplug::*;

	#[plugin_init(link_name = "renamed_plugin_init")]
	fn register(registrar: &mut Registrar<'_>) {
		registrar.register_class(ClassInfo::new("RenamedWidget"));
	}
}

#[test]
fn test_link_name_override() {
	let manifest = new_manifest();
	let init: PluginInitFn = renamed::__dyplug_static_init;
	define_plugin("librenamed", init);
	manifest.load("librenamed", LoadFlags::DEFAULT).unwrap();
	assert_eq!(class_names(&manifest), ["RenamedWidget"]);
}
