use std::cell::Cell;
use std::rc::Rc;

use mockall::predicate::eq;

use pathbind::{callback, object, ChangeCallback, Error, Key, Path, Registry, Value};


use mock::{render, SharedMock, Spy};

fn spy_callback(mock: &SharedMock) -> ChangeCallback {
	callback!((mock) (old, new) => mock.get().trigger(render(old), render(new)))
}

#[test]
fn deep_reattach() {
	let registry = Registry::new();
	let path = Path::dotted(registry, "a.b.c");

	let root = Value::from(object! { a: object! { b: object! { c: 7 } } });
	assert_eq!(path.get(&root), Value::Int(7));

	let mock = SharedMock::new();
	let callback = spy_callback(&mock);

	// The first registration seeds the cached value without firing.
	mock.get().expect_trigger().times(0);
	path.observe(&root, callback.clone()).unwrap();
	mock.get().checkpoint();

	let a = Key::from("a");
	let b = Key::from("b");

	// Breaking an intermediate segment resolves to undefined, once.
	mock.get()
		.expect_trigger()
		.with(eq("7".to_string()), eq("undefined".to_string()))
		.times(1)
		.return_const(());

	let root_a = path.get(&root); // still cached
	let a_object = root.as_object().unwrap().get(&a);
	a_object.as_object().unwrap().set(&b, Value::Undefined);

	assert_eq!(root_a, Value::Int(7));
	assert_eq!(path.get(&root), Value::Undefined);
	mock.get().checkpoint();

	// Repairing it with a fresh subtree fires once with the new value.
	mock.get()
		.expect_trigger()
		.with(eq("undefined".to_string()), eq("\"x\"".to_string()))
		.times(1)
		.return_const(());

	a_object
		.as_object()
		.unwrap()
		.set(&b, object! { c: "x" });

	assert_eq!(path.get(&root), Value::from("x"));
	mock.get().checkpoint();

	// A different intermediate identity with the same terminal value
	// is not an observable change.
	mock.get().expect_trigger().times(0);
	root.as_object()
		.unwrap()
		.set(&a, object! { b: object! { c: "x" } });

	assert_eq!(path.get(&root), Value::from("x"));
	mock.get().checkpoint();

	path.unobserve(&root, &callback).unwrap();
}

#[test]
fn transient_undefined_roundtrip() {
	let registry = Registry::new();
	let path = Path::dotted(registry, "a.b.c");

	let root = Value::from(object! { a: object! { b: object! { c: 7 } } });

	let mock = SharedMock::new();
	let callback = spy_callback(&mock);
	path.observe(&root, callback.clone()).unwrap();

	// Down to undefined and back to an equal terminal value: the
	// transient state fires once each way, never more.
	mock.get()
		.expect_trigger()
		.with(eq("7".to_string()), eq("undefined".to_string()))
		.times(1)
		.return_const(());
	mock.get()
		.expect_trigger()
		.with(eq("undefined".to_string()), eq("7".to_string()))
		.times(1)
		.return_const(());

	let a_object = path_segment(&root, "a");
	a_object.set(&Key::from("b"), Value::Undefined);
	a_object.set(&Key::from("b"), object! { c: 7 });

	assert_eq!(path.get(&root), Value::Int(7));
	mock.get().checkpoint();

	path.unobserve(&root, &callback).unwrap();
}

#[test]
fn noop_writes_fire_nothing() {
	let registry = Registry::new();
	let path = Path::dotted(registry, "a.b");

	let inner = object! { b: 1 };
	let root = Value::from(object! { a: inner.clone() });

	let mock = SharedMock::new();
	let callback = spy_callback(&mock);
	path.observe(&root, callback.clone()).unwrap();

	mock.get().expect_trigger().times(0);

	// Identity-equal writes at both depths.
	inner.set(&Key::from("b"), 1);
	root.as_object().unwrap().set(&Key::from("a"), inner.clone());

	mock.get().checkpoint();

	path.unobserve(&root, &callback).unwrap();
}

#[test]
fn intersecting_paths_do_not_cross_talk() {
	let registry = Registry::new();
	let deep = Path::dotted(registry.clone(), "a.b.c");
	let shallow = Path::dotted(registry, "a.d");

	let root = Value::from(object! {
		a: object! { b: object! { c: 7 }, d: 1 },
	});

	let deep_mock = SharedMock::new();
	let shallow_mock = SharedMock::new();
	let deep_callback = spy_callback(&deep_mock);
	let shallow_callback = spy_callback(&shallow_mock);

	deep.observe(&root, deep_callback.clone()).unwrap();
	shallow.observe(&root, shallow_callback.clone()).unwrap();

	// Changing `d` is invisible to the deep path.
	deep_mock.get().expect_trigger().times(0);
	shallow_mock
		.get()
		.expect_trigger()
		.with(eq("1".to_string()), eq("2".to_string()))
		.times(1)
		.return_const(());

	path_segment(&root, "a").set(&Key::from("d"), 2);

	deep_mock.get().checkpoint();
	shallow_mock.get().checkpoint();

	// Replacing the shared `a` segment changes both terminal values;
	// each path sees exactly its own transition.
	deep_mock
		.get()
		.expect_trigger()
		.with(eq("7".to_string()), eq("8".to_string()))
		.times(1)
		.return_const(());
	shallow_mock
		.get()
		.expect_trigger()
		.with(eq("2".to_string()), eq("3".to_string()))
		.times(1)
		.return_const(());

	root.as_object().unwrap().set(
		&Key::from("a"),
		object! { b: object! { c: 8 }, d: 3 },
	);

	deep_mock.get().checkpoint();
	shallow_mock.get().checkpoint();

	// Tearing down one path leaves the shared instrumentation working
	// for the other.
	deep.unobserve(&root, &deep_callback).unwrap();

	shallow_mock
		.get()
		.expect_trigger()
		.with(eq("3".to_string()), eq("4".to_string()))
		.times(1)
		.return_const(());

	path_segment(&root, "a").set(&Key::from("d"), 4);
	shallow_mock.get().checkpoint();

	shallow.unobserve(&root, &shallow_callback).unwrap();
}

#[test]
fn multiple_callbacks_are_independent() {
	let registry = Registry::new();
	let path = Path::dotted(registry, "a.b");

	let root = Value::from(object! { a: object! { b: 1 } });

	let first = SharedMock::new();
	let second = SharedMock::new();
	let first_callback = spy_callback(&first);
	let second_callback = spy_callback(&second);

	path.observe(&root, first_callback.clone()).unwrap();
	path.observe(&root, second_callback.clone()).unwrap();

	first.get().expect_trigger().times(1).return_const(());
	second.get().expect_trigger().times(1).return_const(());

	path_segment(&root, "a").set(&Key::from("b"), 2);

	first.get().checkpoint();
	second.get().checkpoint();

	assert_eq!(path.unobserve(&root, &second_callback).unwrap(), true);
	// Removing it twice finds nothing.
	assert_eq!(path.unobserve(&root, &second_callback).unwrap(), false);

	first.get().expect_trigger().times(1).return_const(());
	second.get().expect_trigger().times(0);

	path_segment(&root, "a").set(&Key::from("b"), 3);

	first.get().checkpoint();
	second.get().checkpoint();

	path.unobserve(&root, &first_callback).unwrap();
}

#[test]
fn silent_set_changes_value_without_notification() {
	let registry = Registry::new();
	let path = Path::dotted(registry, "a.b.c");

	let root = Value::from(object! { a: object! { b: object! { c: "x" } } });

	let mock = SharedMock::new();
	let callback = spy_callback(&mock);
	path.observe(&root, callback.clone()).unwrap();

	mock.get().expect_trigger().times(0);

	assert!(path.set(&root, Value::from("q"), true));
	assert_eq!(path.get(&root), Value::from("q"));

	// The underlying object really changed, not just the cache.
	let c = path_segment(&root, "a")
		.get(&Key::from("b"))
		.as_object()
		.unwrap()
		.get(&Key::from("c"));
	assert_eq!(c, Value::from("q"));

	mock.get().checkpoint();

	// A non-silent set notifies once.
	mock.get()
		.expect_trigger()
		.with(eq("\"q\"".to_string()), eq("5".to_string()))
		.times(1)
		.return_const(());

	assert!(path.set(&root, Value::Int(5), false));
	assert_eq!(path.get(&root), Value::Int(5));
	mock.get().checkpoint();

	path.unobserve(&root, &callback).unwrap();
}

#[test]
fn write_reverting_a_silent_set_notifies() {
	let registry = Registry::new();
	let path = Path::dotted(registry, "a.b");

	let root = Value::from(object! { a: object! { b: "x" } });

	let mock = SharedMock::new();
	let callback = spy_callback(&mock);
	path.observe(&root, callback.clone()).unwrap();

	mock.get().expect_trigger().times(0);
	assert!(path.set(&root, Value::from("q"), true));
	assert_eq!(path.get(&root), Value::from("q"));
	mock.get().checkpoint();

	// An ordinary write back to the pre-silent-set value is a real
	// transition from the observed "q" and must fire once.
	mock.get()
		.expect_trigger()
		.with(eq("\"q\"".to_string()), eq("\"x\"".to_string()))
		.times(1)
		.return_const(());

	path_segment(&root, "a").set(&Key::from("b"), "x");

	assert_eq!(path.get(&root), Value::from("x"));
	mock.get().checkpoint();

	path.unobserve(&root, &callback).unwrap();
}

#[test]
fn set_fails_on_broken_or_unobserved_paths() {
	let registry = Registry::new();
	let path = Path::dotted(registry, "a.b");

	let root = Value::from(object! { a: object! { b: 1 } });

	// Not observed yet.
	assert!(!path.set(&root, Value::Int(2), false));

	let mock = SharedMock::new();
	let callback = spy_callback(&mock);
	path.observe(&root, callback.clone()).unwrap();

	mock.get().expect_trigger().times(1).return_const(());
	root.as_object().unwrap().set(&Key::from("a"), Value::Null);
	mock.get().checkpoint();

	// The chain is broken at `a`; the terminal link is detached.
	assert!(!path.set(&root, Value::Int(2), false));
	assert_eq!(path.get(&root), Value::Undefined);

	path.unobserve(&root, &callback).unwrap();
}

#[test]
fn invalid_roots_are_rejected() {
	let registry = Registry::new();
	let path = Path::dotted(registry, "a");

	let callback: ChangeCallback = Rc::new(|_, _| {});

	assert_eq!(
		path.observe(&Value::Null, callback.clone()),
		Err(Error::InvalidRoot)
	);
	assert_eq!(
		path.observe(&Value::Undefined, callback.clone()),
		Err(Error::InvalidRoot)
	);
	assert_eq!(
		path.observe(&Value::Int(0), callback.clone()),
		Err(Error::InvalidRoot)
	);
	assert_eq!(
		path.unobserve(&Value::Null, &callback),
		Err(Error::InvalidRoot)
	);

	// Falsy roots never throw from `get`/`set`.
	assert_eq!(path.get(&Value::Null), Value::Undefined);
	assert!(!path.set(&Value::Null, Value::Int(1), false));
}

#[test]
fn cold_get_walks_without_instrumenting() {
	let registry = Registry::new();
	let path = Path::dotted(registry, "a.b.c");

	let root = Value::from(object! { a: object! { b: object! { c: 7 } } });
	assert_eq!(path.get(&root), Value::Int(7));

	// Broken at various depths.
	assert_eq!(
		path.get(&Value::from(object! { a: object! {} })),
		Value::Undefined
	);
	assert_eq!(path.get(&Value::from(object! { a: 0 })), Value::Undefined);
	assert_eq!(path.get(&Value::from(object! { a: false })), Value::Undefined);

	// Nothing was swapped: the original data descriptors are intact.
	let a_object = path_segment(&root, "a");
	let descriptor = a_object.descriptor(&Key::from("b")).unwrap();
	assert!(descriptor.get.is_none());
	assert!(descriptor.set.is_none());
}

#[test]
fn reentrant_unobserve_from_callback() {
	let registry = Registry::new();
	let path = Rc::new(Path::dotted(registry, "a.b"));

	let root = Value::from(object! { a: object! { b: 1 } });

	let second_fired = Rc::new(Cell::new(0u32));
	let second_callback: ChangeCallback = {
		let second_fired = second_fired.clone();
		Rc::new(move |_, _| second_fired.set(second_fired.get() + 1))
	};

	// The first callback tears the second down from inside dispatch.
	let first_callback: ChangeCallback = {
		let path = path.clone();
		let root = root.clone();
		let second = second_callback.clone();
		Rc::new(move |_, _| {
			path.unobserve(&root, &second).ok();
		})
	};

	path.observe(&root, first_callback.clone()).unwrap();
	path.observe(&root, second_callback.clone()).unwrap();

	// Dispatch snapshots the list, so the second still sees this
	// change; it is gone for the next one.
	path_segment(&root, "a").set(&Key::from("b"), 2);
	assert_eq!(second_fired.get(), 1);

	path_segment(&root, "a").set(&Key::from("b"), 3);
	assert_eq!(second_fired.get(), 1);

	path.unobserve(&root, &first_callback).unwrap();
}

#[test]
fn duplicate_registration_fires_per_registration() {
	let registry = Registry::new();
	let path = Path::dotted(registry, "a");

	let root = Value::from(object! { a: 1 });

	let fired = Rc::new(Cell::new(0u32));
	let callback: ChangeCallback = {
		let fired = fired.clone();
		Rc::new(move |_, _| fired.set(fired.get() + 1))
	};

	path.observe(&root, callback.clone()).unwrap();
	path.observe(&root, callback.clone()).unwrap();

	root.as_object().unwrap().set(&Key::from("a"), 2);
	assert_eq!(fired.get(), 2);

	// Each unobserve drains one registration.
	assert!(path.unobserve(&root, &callback).unwrap());
	root.as_object().unwrap().set(&Key::from("a"), 3);
	assert_eq!(fired.get(), 3);

	assert!(path.unobserve(&root, &callback).unwrap());
	root.as_object().unwrap().set(&Key::from("a"), 4);
	assert_eq!(fired.get(), 3);
}

fn path_segment(root: &Value, key: &str) -> pathbind::Object {
	root.as_object()
		.unwrap()
		.get(&Key::from(key))
		.as_object()
		.unwrap()
		.clone()
}
