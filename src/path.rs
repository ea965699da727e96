use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::addr::WeakAddr;
use crate::link::{Link, Segment};
use crate::observer::Registry;
use crate::value::{Key, Object, ObjectInner, Value};
use crate::Error;

/// Invoked with `(old, new)` resolved values, exactly once per actual
/// final-value transition.
pub type ChangeCallback = Rc<dyn Fn(&Value, &Value)>;

type RootAddr = WeakAddr<RefCell<ObjectInner>>;

/// A declared property path. Built once, observable against any number
/// of roots; roots are held weakly, so observation alone never keeps
/// one alive.
pub struct Path {
	body: Rc<PathBody>,
}

struct PathBody {
	registry: Rc<Registry>,
	segments: Vec<Key>,
	template: Rc<Segment>,
	observed: RefCell<BTreeMap<RootAddr, ChainState>>,
}

/// Everything one (path, root) pair owns while at least one callback
/// is registered.
struct ChainState {
	head: Link,
	value: Value,
	callbacks: SmallVec<[ChangeCallback; 2]>,
}

impl Path {
	pub fn new(registry: Rc<Registry>, segments: impl IntoIterator<Item = Key>) -> Path {
		let segments: Vec<Key> = segments.into_iter().collect();
		assert!(!segments.is_empty(), "a path needs at least one segment");

		let template = Segment::template(&segments);

		Path {
			body: Rc::new(PathBody {
				registry,
				segments,
				template,
				observed: RefCell::new(BTreeMap::new()),
			}),
		}
	}

	/// `Path::dotted(registry, "a.b.c")` ≡ `Path::new(registry, [a, b, c])`.
	pub fn dotted(registry: Rc<Registry>, path: &str) -> Path {
		Path::new(registry, path.split('.').map(Key::from))
	}

	pub fn segments(&self) -> &[Key] {
		&self.body.segments
	}

	/// Resolves the path against `root`: the cached value in O(1) for
	/// an actively observed root, otherwise a cold walk that installs
	/// nothing and short-circuits to `Undefined` at the first falsy or
	/// non-object intermediate.
	pub fn get(&self, root: &Value) -> Value {
		if let Some(object) = root.as_object() {
			let observed = self.body.observed.borrow();
			if let Some(state) = observed.get(&WeakAddr::new(object.downgrade())) {
				return state.value.clone();
			}
		}

		let mut current = root.clone();
		for key in &self.body.segments {
			if !current.is_truthy() {
				return Value::Undefined;
			}
			current = match current.as_object() {
				Some(object) => object.get(key),
				None => return Value::Undefined,
			};
		}
		current
	}

	/// Registers `callback` for resolved-value changes under `root`.
	/// The first callback for a root builds and attaches the chain and
	/// seeds the cached value; no synthetic initial notification is
	/// delivered. Later callbacks share the attached chain.
	pub fn observe(&self, root: &Value, callback: ChangeCallback) -> Result<(), Error> {
		let object = self.root_object(root)?;
		let addr = WeakAddr::new(object.downgrade());

		{
			let mut observed = self.body.observed.borrow_mut();
			if let Some(state) = observed.get_mut(&addr) {
				state.callbacks.push(callback);
				return Ok(());
			}
		}

		tracing::debug!(root = ?object, "attaching chain");

		let sink = {
			let this = Rc::downgrade(&self.body);
			let addr = addr.clone();
			Rc::new(move |value: &Value| {
				if let Some(body) = this.upgrade() {
					body.changed(&addr, value);
				}
			})
		};

		let head = Link::chain(self.body.template.clone(), self.body.registry.clone(), sink);

		let value = match head.attach(&object) {
			Ok(value) => value,
			Err(error) => {
				// No partial instrumentation survives a failed observe.
				head.detach();
				return Err(error);
			}
		};

		self.body.observed.borrow_mut().insert(
			addr,
			ChainState {
				head,
				value,
				callbacks: smallvec::smallvec![callback],
			},
		);

		Ok(())
	}

	/// Removes `callback` (matched by identity) from `root`. Draining
	/// the last callback detaches the whole chain and restores every
	/// instrumented property. Returns whether the callback was found.
	pub fn unobserve(&self, root: &Value, callback: &ChangeCallback) -> Result<bool, Error> {
		let object = self.root_object(root)?;
		let addr = WeakAddr::new(object.downgrade());

		let drained = {
			let mut observed = self.body.observed.borrow_mut();
			let state = match observed.get_mut(&addr) {
				Some(state) => state,
				None => return Ok(false),
			};

			match state.callbacks.iter().position(|c| Rc::ptr_eq(c, callback)) {
				Some(index) => {
					state.callbacks.remove(index);
				}
				None => return Ok(false),
			}

			if state.callbacks.is_empty() {
				observed.remove(&addr)
			} else {
				None
			}
		};

		if let Some(state) = drained {
			tracing::debug!(root = ?object, "detaching chain");
			state.head.detach();
		}

		Ok(true)
	}

	/// Writes through the terminal property. Returns `false` without
	/// effect when the root is not observed or the chain is currently
	/// broken. A silent write suppresses notification for *every*
	/// observer sharing that property, not just this path's.
	pub fn set(&self, root: &Value, value: Value, silent: bool) -> bool {
		let object = match root.as_object() {
			Some(object) => object,
			None => return false,
		};
		let addr = WeakAddr::new(object.downgrade());

		let head = {
			let observed = self.body.observed.borrow();
			match observed.get(&addr) {
				Some(state) => state.head.clone(),
				None => return false,
			}
		};

		if !head.write_terminal(value.clone(), silent) {
			return false;
		}

		if let Some(state) = self.body.observed.borrow_mut().get_mut(&addr) {
			state.value = value;
		}

		true
	}

	fn root_object(&self, root: &Value) -> Result<Object, Error> {
		if !root.is_truthy() {
			return Err(Error::InvalidRoot);
		}
		match root.as_object() {
			Some(object) => Ok(object.clone()),
			None => Err(Error::InvalidRoot),
		}
	}
}

impl PathBody {
	/// The deduplication point: a link reported a new resolved value
	/// for `root`. Callbacks fire only when it differs from the cached
	/// resolved value, so N segment reassignments fan in to at most
	/// one notification per actual transition.
	fn changed(&self, root: &RootAddr, value: &Value) {
		let (old, callbacks) = {
			let observed = self.observed.borrow();
			match observed.get(root) {
				None => {
					// Unreachable without a bug: links are detached
					// before their chain state is dropped.
					tracing::error!("change notification for an inactive root");
					return;
				}
				Some(state) => {
					if state.value == *value {
						return;
					}
					(state.value.clone(), state.callbacks.clone())
				}
			}
		};

		for callback in callbacks.iter() {
			callback(&old, value);
		}

		let mut observed = self.observed.borrow_mut();
		if let Some(state) = observed.get_mut(root) {
			// A reentrant change from inside a callback wins.
			if state.value == old {
				state.value = value.clone();
			}
		}
	}
}

impl Drop for PathBody {
	fn drop(&mut self) {
		let observed = std::mem::take(&mut *self.observed.borrow_mut());
		for (_, state) in observed {
			state.head.detach();
		}
	}
}
