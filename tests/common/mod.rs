// Copyright (c) 2023 Jonathan "Razordor" Alan Thomason
#![allow(dead_code)]

use dyplug::*;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::{io, mem, ptr};

type SymbolTable = BTreeMap<String, usize>;

// Library definitions are shared by every thread of the test binary, so a manifest can be
// driven from spawned threads. A name always maps to the same symbols.
static LIBRARIES: Mutex<BTreeMap<String, SymbolTable>> = Mutex::new(BTreeMap::new());

fn libraries() -> MutexGuard<'static, BTreeMap<String, SymbolTable>> {
	LIBRARIES.lock().unwrap_or_else(PoisonError::into_inner)
}

// Counters and events are per thread, so tests running side by side never see each
// other's.
thread_local! {
	static OPENED: Cell<usize> = Cell::new(0);
	static CLOSED: Cell<usize> = Cell::new(0);
	static EVENTS: RefCell<Vec<String>> = RefCell::new(Vec::new());
}

pub fn log(event: impl Into<String>) {
	EVENTS.with(|events| events.borrow_mut().push(event.into()));
}

pub fn events() -> Vec<String> {
	EVENTS.with(|events| events.borrow().clone())
}

pub fn take_events() -> Vec<String> {
	EVENTS.with(|events| mem::take(&mut *events.borrow_mut()))
}

pub fn opened() -> usize {
	OPENED.with(Cell::get)
}

pub fn closed() -> usize {
	CLOSED.with(Cell::get)
}

/// Makes `name` loadable, exporting `symbols`.
pub fn define(name: &str, symbols: &[(&str, usize)]) {
	let symbols = symbols
		.iter()
		.map(|(symbol, addr)| (symbol.to_string(), *addr))
		.collect();
	libraries().insert(name.to_owned(), symbols);
}

/// Makes `name` loadable, running `init` when it is opened.
pub fn define_plugin(name: &str, init: PluginInitFn) {
	define(name, &[(INIT_SYMBOL, init as usize)]);
}

/// An in-process stand-in for the OS loader.
#[derive(Debug)]
pub struct Fake {
	name: String,
	symbols: SymbolTable,
}

unsafe impl Loader for Fake {
	unsafe fn open(path: &OsStr, _flags: LoadFlags) -> io::Result<Self> {
		let name = path.to_string_lossy().into_owned();
		let symbols = libraries().get(&name).cloned();
		match symbols {
			Some(symbols) => {
				OPENED.with(|count| count.set(count.get() + 1));
				log(format!("open {name}"));
				Ok(Self { name, symbols })
			}
			None => Err(io::Error::new(
				io::ErrorKind::NotFound,
				format!("{name}: cannot open shared object file"),
			)),
		}
	}

	unsafe fn this() -> io::Result<Self> {
		Ok(Self {
			name: "<this>".to_owned(),
			symbols: SymbolTable::new(),
		})
	}

	unsafe fn symbol(&self, name: &str) -> *const () {
		self.symbols
			.get(name)
			.map_or(ptr::null(), |&addr| addr as *const ())
	}

	unsafe fn close(self) -> io::Result<()> {
		CLOSED.with(|count| count.set(count.get() + 1));
		log(format!("close {}", self.name));
		Ok(())
	}
}

pub struct Recorder {
	name: String,
	ok: bool,
	panics: bool,
}

impl Recorder {
	pub fn new(name: &str) -> Self {
		Self {
			name: name.to_owned(),
			ok: true,
			panics: false,
		}
	}

	pub fn failing(name: &str) -> Self {
		Self {
			name: name.to_owned(),
			ok: false,
			panics: false,
		}
	}

	pub fn panicking(name: &str) -> Self {
		Self {
			name: name.to_owned(),
			ok: true,
			panics: true,
		}
	}
}

impl Module for Recorder {
	fn name(&self) -> &str {
		&self.name
	}
	fn on_init(&mut self) -> bool {
		log(format!("init {}", self.name));
		if self.panics {
			panic!("module {} exploded", self.name);
		}
		self.ok
	}
	fn on_exit(&mut self) {
		log(format!("exit {}", self.name));
	}
}

#[derive(Debug, PartialEq)]
pub struct Widget(pub u32);

impl Drop for Widget {
	fn drop(&mut self) {
		log("drop widget");
	}
}

fn new_widget() -> Box<dyn Any + Send> {
	Box::new(Widget(7))
}

pub fn libfoo_init(registrar: &mut Registrar<'_>) {
	registrar.register_class(
		ClassInfo::new("FooWidget")
			.with_base("Object")
			.with_constructor(new_widget),
	);
	registrar.register_class(ClassInfo::new("FooDialog").with_base("Object"));
	registrar.register_module(Recorder::new("foo"));
}

pub fn libbar_init(registrar: &mut Registrar<'_>) {
	registrar.register_class(ClassInfo::new("BarView"));
	registrar.register_module(Recorder::new("bar"));
}

pub fn libbadmod_init(registrar: &mut Registrar<'_>) {
	registrar.register_class(ClassInfo::new("BadThing"));
	registrar.register_module(Recorder::new("good"));
	registrar.register_module(Recorder::failing("broken"));
}

pub fn libpanic_init(registrar: &mut Registrar<'_>) {
	registrar.register_class(ClassInfo::new("Half").with_constructor(new_widget));
	registrar.register_module(Recorder::new("half"));
	panic!("init exploded");
}

pub fn libpanicmod_init(registrar: &mut Registrar<'_>) {
	registrar.register_class(ClassInfo::new("Fragile"));
	registrar.register_module(Recorder::new("steady"));
	registrar.register_module(Recorder::panicking("boom"));
	registrar.register_module(Recorder::new("never"));
}

/// Worker `N` registers `N + 1` classes named `WorkerN.i` and one module.
pub fn worker_init<const N: usize>(registrar: &mut Registrar<'_>) {
	for i in 0..=N {
		registrar.register_class(ClassInfo::new(format!("Worker{N}.{i}")));
	}
	registrar.register_module(Recorder::new(&format!("worker{N}")));
}

pub const WORKERS: [PluginInitFn; 8] = [
	worker_init::<0>,
	worker_init::<1>,
	worker_init::<2>,
	worker_init::<3>,
	worker_init::<4>,
	worker_init::<5>,
	worker_init::<6>,
	worker_init::<7>,
];

pub fn worker_name(n: usize) -> String {
	format!("libworker{n}")
}

pub extern "C" fn answer() -> i32 {
	42
}

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_test_writer()
		.try_init();
}

/// Resets this thread's counters and defines the standard plugins.
pub fn setup() {
	init_tracing();
	OPENED.with(|count| count.set(0));
	CLOSED.with(|count| count.set(0));
	take_events();

	define_plugin("libfoo", libfoo_init);
	define_plugin("libbar", libbar_init);
	define_plugin("libbadmod", libbadmod_init);
	define_plugin("libfoo2", libfoo_init);
	define_plugin("libpanic", libpanic_init);
	define_plugin("libpanicmod", libpanicmod_init);
	define("libplain", &[("answer", answer as usize)]);
	for (n, init) in WORKERS.iter().enumerate() {
		define_plugin(&worker_name(n), *init);
	}
}

pub fn class_names<L: Loader>(manifest: &Manifest<L>) -> Vec<String> {
	manifest
		.with_classes(|classes| {
			classes
				.iter()
				.map(|(_, info)| info.name().to_owned())
				.collect()
		})
		.unwrap()
}

pub fn new_manifest() -> Manifest<Fake> {
	setup();
	Manifest::new()
}
