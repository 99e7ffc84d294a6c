// Copyright (c) 2023 Jonathan "Razordor" Alan Thomason
use std::panic::{self, AssertUnwindSafe};
use std::{fmt, mem};

use tracing::{error, trace};

use crate::error::panic_message;

/// An init/cleanup hook contributed by library code.
///
/// Modules are queued while a library initializes and are started by the host at a
/// controlled time, then stopped again before the library is unmapped.
pub trait Module: Send {
	fn name(&self) -> &str;
	/// Returns `false` if the module could not start.
	fn on_init(&mut self) -> bool;
	fn on_exit(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(u64);

/// Pending and running modules.
#[derive(Default)]
pub struct ModuleRegistry {
	pending: Vec<Box<dyn Module>>,
	active: Vec<(ModuleId, Box<dyn Module>)>,
	next_id: u64,
}

impl ModuleRegistry {
	#[inline]
	pub const fn new() -> Self {
		Self {
			pending: Vec::new(),
			active: Vec::new(),
			next_id: 0,
		}
	}

	/// Queues `module` until the next [`init_pending`](Self::init_pending).
	#[inline]
	pub fn register(&mut self, module: Box<dyn Module>) {
		self.pending.push(module);
	}

	#[inline]
	pub fn pending_len(&self) -> usize {
		self.pending.len()
	}

	#[inline]
	pub fn active_len(&self) -> usize {
		self.active.len()
	}

	#[inline]
	pub fn is_active(&self, id: ModuleId) -> bool {
		self.active.iter().any(|(active, _)| *active == id)
	}

	/// Drops the pending modules without starting them.
	pub fn discard_pending(&mut self) -> usize {
		let dropped = self.pending.len();
		self.pending.clear();
		dropped
	}

	/// Starts every pending module in registration order.
	///
	/// Returns the ids of the modules this call started. If a module fails or panics, the
	/// modules started by this call are stopped in reverse order, the rest of the queue is
	/// dropped, and the name of the failing module is returned.
	pub fn init_pending(&mut self) -> Result<Vec<ModuleId>, String> {
		let mut started = Vec::with_capacity(self.pending.len());
		for mut module in mem::take(&mut self.pending) {
			let name = module.name().to_owned();
			if guarded(&name, "on_init", || module.on_init()) != Some(true) {
				error!(module = %name, "module failed to initialize");
				self.cleanup(&started);
				return Err(name);
			}
			let id = ModuleId(self.next_id);
			self.next_id += 1;
			trace!(module = %name, "module initialized");
			self.active.push((id, module));
			started.push(id);
		}
		Ok(started)
	}

	/// Stops the modules in `ids`, last one first, and drops them.
	pub fn cleanup(&mut self, ids: &[ModuleId]) {
		for id in ids.iter().rev() {
			if let Some(pos) = self.active.iter().position(|(active, _)| active == id) {
				let (_, mut module) = self.active.remove(pos);
				let name = module.name().to_owned();
				guarded(&name, "on_exit", || module.on_exit());
				trace!(module = %name, "module cleaned up");
			}
		}
	}
}

// Module hooks run while the manifest is locked; a panic is logged and reported as `None`.
fn guarded<R>(module: &str, hook: &str, f: impl FnOnce() -> R) -> Option<R> {
	match panic::catch_unwind(AssertUnwindSafe(f)) {
		Ok(value) => Some(value),
		Err(payload) => {
			error!(module, hook, panic = panic_message(&*payload), "module hook panicked");
			None
		}
	}
}

impl fmt::Debug for ModuleRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ModuleRegistry")
			.field("pending", &self.pending.iter().map(|m| m.name()).collect::<Vec<_>>())
			.field("active", &self.active.iter().map(|(_, m)| m.name()).collect::<Vec<_>>())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::{Arc, Mutex};

	type Log = Arc<Mutex<Vec<String>>>;

	struct Stub {
		name: &'static str,
		ok: bool,
		log: Log,
	}

	impl Module for Stub {
		fn name(&self) -> &str {
			self.name
		}
		fn on_init(&mut self) -> bool {
			self.log.lock().unwrap().push(format!("init {}", self.name));
			self.ok
		}
		fn on_exit(&mut self) {
			self.log.lock().unwrap().push(format!("exit {}", self.name));
		}
	}

	fn stub(name: &'static str, ok: bool, log: &Log) -> Box<dyn Module> {
		Box::new(Stub {
			name,
			ok,
			log: log.clone(),
		})
	}

	#[test]
	fn cleanup_runs_in_reverse() {
		let log = Log::default();
		let mut modules = ModuleRegistry::new();
		modules.register(stub("a", true, &log));
		modules.register(stub("b", true, &log));
		let ids = modules.init_pending().unwrap();
		assert_eq!(ids.len(), 2);
		assert_eq!(modules.active_len(), 2);
		assert_eq!(modules.pending_len(), 0);

		modules.cleanup(&ids);
		assert_eq!(modules.active_len(), 0);
		assert_eq!(*log.lock().unwrap(), ["init a", "init b", "exit b", "exit a"]);
	}

	#[test]
	fn failure_unwinds_this_batch_only() {
		let log = Log::default();
		let mut modules = ModuleRegistry::new();
		modules.register(stub("host", true, &log));
		let host = modules.init_pending().unwrap();

		modules.register(stub("a", true, &log));
		modules.register(stub("bad", false, &log));
		modules.register(stub("never", true, &log));
		assert_eq!(modules.init_pending(), Err("bad".to_owned()));

		assert_eq!(modules.active_len(), 1);
		assert!(modules.is_active(host[0]));
		assert_eq!(modules.pending_len(), 0);
		assert_eq!(*log.lock().unwrap(), ["init host", "init a", "init bad", "exit a"]);
	}

	struct Panicky;

	impl Module for Panicky {
		fn name(&self) -> &str {
			"panicky"
		}
		fn on_init(&mut self) -> bool {
			panic!("on_init exploded")
		}
		fn on_exit(&mut self) {}
	}

	#[test]
	fn panic_counts_as_failure() {
		let log = Log::default();
		let mut modules = ModuleRegistry::new();
		modules.register(stub("a", true, &log));
		modules.register(Box::new(Panicky));
		modules.register(stub("never", true, &log));
		assert_eq!(modules.init_pending(), Err("panicky".to_owned()));
		assert_eq!(modules.active_len(), 0);
		assert_eq!(modules.pending_len(), 0);
		assert_eq!(*log.lock().unwrap(), ["init a", "exit a"]);
	}

	#[test]
	fn discard_pending_skips_init() {
		let log = Log::default();
		let mut modules = ModuleRegistry::new();
		modules.register(stub("a", true, &log));
		assert_eq!(modules.discard_pending(), 1);
		assert_eq!(modules.init_pending(), Ok(vec![]));
		assert!(log.lock().unwrap().is_empty());
	}
}
