// Copyright (c) 2023 Jonathan "Razordor" Alan Thomason
//! The process class list.
//!
//! Classes are linked newest-first, the way static initializers would prepend them.
//! Records are never moved: removed slots become tombstones so a [`ClassId`] stays
//! meaningful for as long as the registry lives.
use std::any::Any;
use std::fmt;

/// Creates a fresh instance of a registered class.
pub type Constructor = fn() -> Box<dyn Any + Send>;

/// Describes one class known to the host.
#[derive(Clone, PartialEq)]
pub struct ClassInfo {
	name: String,
	base: Option<String>,
	constructor: Option<Constructor>,
}

impl ClassInfo {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			base: None,
			constructor: None,
		}
	}

	pub fn with_base(mut self, base: impl Into<String>) -> Self {
		self.base = Some(base.into());
		self
	}

	pub fn with_constructor(mut self, constructor: Constructor) -> Self {
		self.constructor = Some(constructor);
		self
	}

	#[inline]
	pub fn name(&self) -> &str {
		&self.name
	}

	#[inline]
	pub fn base(&self) -> Option<&str> {
		self.base.as_deref()
	}

	#[inline]
	pub fn constructor(&self) -> Option<Constructor> {
		self.constructor
	}
}

impl fmt::Debug for ClassInfo {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ClassInfo")
			.field("name", &self.name)
			.field("base", &self.base)
			.field("dynamic", &self.constructor.is_some())
			.finish()
	}
}

/// Index of a record in a [`ClassRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(usize);

#[derive(Debug)]
struct Slot {
	// `None` once removed
	info: Option<ClassInfo>,
	next: Option<ClassId>,
}

/// A singly linked list of class records backed by an append-only arena.
#[derive(Debug, Default)]
pub struct ClassRegistry {
	slots: Vec<Slot>,
	head: Option<ClassId>,
	len: usize,
}

impl ClassRegistry {
	#[inline]
	pub const fn new() -> Self {
		Self {
			slots: Vec::new(),
			head: None,
			len: 0,
		}
	}

	/// Prepends `info`, making it the new head.
	pub fn register(&mut self, info: ClassInfo) -> ClassId {
		let id = ClassId(self.slots.len());
		self.slots.push(Slot {
			info: Some(info),
			next: self.head,
		});
		self.head = Some(id);
		self.len += 1;
		id
	}

	#[inline]
	pub fn head(&self) -> Option<ClassId> {
		self.head
	}

	fn slot(&self, id: ClassId) -> Option<&Slot> {
		self.slots.get(id.0).filter(|slot| slot.info.is_some())
	}

	/// The record after `id`, or `None` at the tail or if `id` was removed.
	#[inline]
	pub fn next(&self, id: ClassId) -> Option<ClassId> {
		self.slot(id).and_then(|slot| slot.next)
	}

	#[inline]
	pub fn get(&self, id: ClassId) -> Option<&ClassInfo> {
		self.slot(id).and_then(|slot| slot.info.as_ref())
	}

	pub fn find(&self, name: &str) -> Option<ClassId> {
		self.iter()
			.find(|(_, info)| info.name() == name)
			.map(|(id, _)| id)
	}

	/// Number of live records.
	#[inline]
	pub fn len(&self) -> usize {
		self.len
	}

	#[inline]
	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	/// Walks the list from the head.
	#[inline]
	pub fn iter(&self) -> Iter<'_> {
		Iter {
			registry: self,
			cur: self.head,
		}
	}

	/// Finds the record linking to `id`.
	///
	/// Returns `Some(None)` when `id` is the head and `None` when `id` is not in the list.
	pub fn predecessor(&self, id: ClassId) -> Option<Option<ClassId>> {
		if self.head == Some(id) {
			return Some(None);
		}
		let mut cur = self.head;
		while let Some(at) = cur {
			let next = self.next(at);
			if next == Some(id) {
				return Some(Some(at));
			}
			cur = next;
		}
		None
	}

	/// Returns `(first, last, count)` of the records prepended since the head was `old_head`.
	///
	/// Returns `None` if nothing was added, or if `old_head` is no longer reachable.
	pub fn added_since(&self, old_head: Option<ClassId>) -> Option<(ClassId, ClassId, usize)> {
		let first = self.head?;
		if Some(first) == old_head {
			return None;
		}
		let mut last = first;
		let mut count = 1;
		loop {
			let next = self.next(last);
			if next == old_head {
				return Some((first, last, count));
			}
			last = next?;
			count += 1;
		}
	}

	/// Unlinks the contiguous run `first..=last`, wherever it sits in the list.
	///
	/// Returns the number of records removed, or `None` without touching the list if
	/// `first` is not linked or `last` cannot be reached from it.
	pub fn remove_range(&mut self, first: ClassId, last: ClassId) -> Option<usize> {
		let prev = self.predecessor(first)?;
		let mut run = vec![first];
		let mut cur = first;
		while cur != last {
			cur = self.next(cur)?;
			run.push(cur);
		}
		let after = self.next(last);
		match prev {
			None => self.head = after,
			Some(prev) => self.slots[prev.0].next = after,
		}
		for id in &run {
			let slot = &mut self.slots[id.0];
			slot.info = None;
			slot.next = None;
		}
		self.len -= run.len();
		Some(run.len())
	}
}

/// Iterator over live records, newest first.
pub struct Iter<'a> {
	registry: &'a ClassRegistry,
	cur: Option<ClassId>,
}

impl<'a> Iterator for Iter<'a> {
	type Item = (ClassId, &'a ClassInfo);

	fn next(&mut self) -> Option<Self::Item> {
		let id = self.cur?;
		let info = self.registry.get(id)?;
		self.cur = self.registry.next(id);
		Some((id, info))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn names(registry: &ClassRegistry) -> Vec<&str> {
		registry.iter().map(|(_, info)| info.name()).collect()
	}

	fn registry_of(classes: &[&str]) -> (ClassRegistry, Vec<ClassId>) {
		let mut registry = ClassRegistry::new();
		let ids = classes
			.iter()
			.map(|name| registry.register(ClassInfo::new(*name)))
			.collect();
		(registry, ids)
	}

	#[test]
	fn register_prepends() {
		let (registry, ids) = registry_of(&["a", "b", "c"]);
		assert_eq!(names(&registry), ["c", "b", "a"]);
		assert_eq!(registry.head(), Some(ids[2]));
		assert_eq!(registry.next(ids[0]), None);
		assert_eq!(registry.find("b"), Some(ids[1]));
	}

	#[test]
	fn added_since_reports_new_run() {
		let (mut registry, _) = registry_of(&["a", "b"]);
		let before = registry.head();
		assert_eq!(registry.added_since(before), None);
		let c = registry.register(ClassInfo::new("c"));
		let d = registry.register(ClassInfo::new("d"));
		assert_eq!(registry.added_since(before), Some((d, c, 2)));

		let mut empty = ClassRegistry::new();
		let x = empty.register(ClassInfo::new("x"));
		assert_eq!(empty.added_since(None), Some((x, x, 1)));
	}

	#[test]
	fn remove_range_at_head() {
		let (mut registry, ids) = registry_of(&["a", "b", "c", "d"]);
		assert_eq!(registry.remove_range(ids[3], ids[2]), Some(2));
		assert_eq!(names(&registry), ["b", "a"]);
		assert_eq!(registry.len(), 2);
		assert_eq!(registry.get(ids[3]), None);
	}

	#[test]
	fn remove_range_in_middle() {
		let (mut registry, ids) = registry_of(&["a", "b", "c", "d", "e"]);
		assert_eq!(registry.remove_range(ids[3], ids[1]), Some(3));
		assert_eq!(names(&registry), ["e", "a"]);
		assert_eq!(registry.next(ids[4]), Some(ids[0]));
	}

	#[test]
	fn remove_range_at_tail() {
		let (mut registry, ids) = registry_of(&["a", "b", "c"]);
		assert_eq!(registry.remove_range(ids[1], ids[0]), Some(2));
		assert_eq!(names(&registry), ["c"]);
		assert_eq!(registry.next(ids[2]), None);
	}

	#[test]
	fn remove_range_rejects_bad_range() {
		let (mut registry, ids) = registry_of(&["a", "b", "c"]);
		// `last` comes before `first`
		assert_eq!(registry.remove_range(ids[0], ids[2]), None);
		assert_eq!(names(&registry), ["c", "b", "a"]);

		assert_eq!(registry.remove_range(ids[1], ids[1]), Some(1));
		assert_eq!(registry.remove_range(ids[1], ids[1]), None);
		assert_eq!(names(&registry), ["c", "a"]);
	}
}
