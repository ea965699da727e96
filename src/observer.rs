use std::cell::RefCell;
use std::rc::{Rc, Weak};

use fxhash::FxHashMap;
use smallvec::SmallVec;

use crate::value::{Descriptor, Getter, Key, Object, ObjectInner, Setter, Value};
use crate::Error;

/// Invoked with the owning object and the incoming value whenever an
/// observed property actually changes.
pub type PropertyCallback = Rc<dyn Fn(&Object, &Value)>;

/// The keyed map of live property observers. At most one
/// [`ObserverBody`] exists per (object, property) pair, so unrelated
/// observers intersecting at the same property share one descriptor
/// swap. Owned by the application and injected into every [`Path`].
///
/// [`Path`]: crate::Path
pub struct Registry {
	observers: RefCell<FxHashMap<(usize, Key), Rc<ObserverBody>>>,
}

impl Registry {
	pub fn new() -> Rc<Registry> {
		Rc::new(Registry {
			observers: RefCell::new(FxHashMap::default()),
		})
	}

	/// Registers `callback` for changes of `object[key]`, instrumenting
	/// the property on first use. Fails fast on a non-configurable
	/// descriptor, leaving the object untouched.
	pub fn observe(
		self: &Rc<Self>,
		object: &Object,
		key: &Key,
		callback: PropertyCallback,
	) -> Result<Subscription, Error> {
		let map_key = (object.addr(), key.clone());

		let existing = self
			.observers
			.borrow()
			.get(&map_key)
			.cloned()
			// An entry whose object is gone is a stale leftover from a
			// dropped target; the address may have been reused.
			.filter(|body| body.object.upgrade().is_some());

		let body = match existing {
			Some(body) => body,
			None => {
				let body = ObserverBody::install(self, object, key)?;
				self.observers.borrow_mut().insert(map_key, body.clone());
				body
			}
		};

		body.callbacks.borrow_mut().push(callback.clone());

		Ok(Subscription { body, callback })
	}

	/// Removes `callback` (matched by identity) from `object[key]`.
	/// Draining the last callback restores the original descriptor.
	/// Returns whether the callback was found.
	pub fn unobserve(&self, object: &Object, key: &Key, callback: &PropertyCallback) -> bool {
		self.remove(object.addr(), key, callback)
	}

	fn remove(&self, addr: usize, key: &Key, callback: &PropertyCallback) -> bool {
		let map_key = (addr, key.clone());

		let body = match self.observers.borrow().get(&map_key) {
			Some(body) => body.clone(),
			None => return false,
		};

		let drained = {
			let mut callbacks = body.callbacks.borrow_mut();
			match callbacks.iter().position(|c| Rc::ptr_eq(c, callback)) {
				Some(index) => {
					callbacks.remove(index);
				}
				None => return false,
			}
			callbacks.is_empty()
		};

		if drained {
			self.observers.borrow_mut().remove(&map_key);
			body.restore();
		}

		true
	}

	/// Whether any property is currently instrumented.
	pub fn is_empty(&self) -> bool {
		self.observers.borrow().is_empty()
	}
}

/// The per-(object, property) instrumentation: the swapped-in accessor
/// pair routes writes through [`ObserverBody::write`], which fans out
/// to every registered callback before forwarding to the original
/// setter.
pub struct ObserverBody {
	registry: Weak<Registry>,
	object: Weak<RefCell<ObjectInner>>,
	addr: usize,
	key: Key,
	/// `None` when the property did not previously exist.
	original: Option<Descriptor>,
	/// Get-only accessor: reads pass through untouched, writes are
	/// absorbed, the descriptor is never swapped.
	passthrough: bool,
	cached: RefCell<Value>,
	callbacks: RefCell<SmallVec<[PropertyCallback; 2]>>,
}

impl ObserverBody {
	fn install(registry: &Rc<Registry>, object: &Object, key: &Key) -> Result<Rc<Self>, Error> {
		let original = object.descriptor(key);

		if let Some(descriptor) = &original {
			if !descriptor.configurable {
				return Err(Error::NotConfigurable(key.clone()));
			}
		}

		let passthrough = original
			.as_ref()
			.map_or(false, |d| d.get.is_some() && d.set.is_none());

		let cached = object.get(key);

		let body = Rc::new(ObserverBody {
			registry: Rc::downgrade(registry),
			object: object.downgrade(),
			addr: object.addr(),
			key: key.clone(),
			original: original.clone(),
			passthrough,
			cached: RefCell::new(cached),
			callbacks: RefCell::new(SmallVec::new_const()),
		});

		if !passthrough {
			tracing::trace!(key = %key, "instrumenting property");

			let get: Getter = match original.as_ref().and_then(|d| d.get.clone()) {
				Some(get) => get,
				None => {
					let this = Rc::downgrade(&body);
					Rc::new(move |_object| match this.upgrade() {
						Some(body) => body.cached.borrow().clone(),
						None => Value::Undefined,
					})
				}
			};

			let set: Setter = {
				let this = Rc::downgrade(&body);
				Rc::new(move |_object, value| {
					if let Some(body) = this.upgrade() {
						body.write(value, false);
					}
				})
			};

			object.define(
				key,
				Descriptor {
					value: None,
					get: Some(get),
					set: Some(set),
					writable: false,
					enumerable: original.as_ref().map_or(true, |d| d.enumerable),
					configurable: true,
				},
			);
		}

		Ok(body)
	}

	fn target(&self) -> Option<Object> {
		self.object.upgrade().map(Object::from_inner)
	}

	pub(crate) fn current(&self) -> Value {
		if self.passthrough {
			match self.target() {
				Some(object) => object.get(&self.key),
				None => Value::Undefined,
			}
		} else {
			self.cached.borrow().clone()
		}
	}

	/// The interception point. Identity-equal writes are no-ops; real
	/// changes notify callbacks in registration order, update the
	/// cache, and only then run the original setter, so chain
	/// machinery re-attaches before any downstream accessor effect.
	pub(crate) fn write(&self, value: Value, silent: bool) {
		if self.passthrough {
			return;
		}

		if *self.cached.borrow() == value {
			return;
		}

		let object = match self.target() {
			Some(object) => object,
			None => {
				*self.cached.borrow_mut() = value;
				return;
			}
		};

		if !silent {
			let callbacks = self.callbacks.borrow().clone();
			for callback in callbacks.iter() {
				callback(&object, &value);
			}
		}

		*self.cached.borrow_mut() = value.clone();

		if let Some(set) = self.original.as_ref().and_then(|d| d.set.clone()) {
			set(&object, value);
		}
	}

	/// Puts the property back the way [`install`] found it, carrying
	/// the current value for data descriptors. A property that never
	/// existed and was never written disappears again.
	///
	/// [`install`]: ObserverBody::install
	fn restore(&self) {
		if self.passthrough {
			return;
		}

		let object = match self.target() {
			Some(object) => object,
			None => return,
		};

		tracing::trace!(key = %self.key, "restoring property descriptor");

		match &self.original {
			Some(descriptor) if descriptor.is_accessor() => {
				object.define(&self.key, descriptor.clone());
			}
			Some(descriptor) => {
				let mut descriptor = descriptor.clone();
				descriptor.value = Some(self.cached.borrow().clone());
				object.define(&self.key, descriptor);
			}
			None => {
				let cached = self.cached.borrow().clone();
				if cached.is_undefined() {
					object.remove(&self.key);
				} else {
					object.define(&self.key, Descriptor::data(cached));
				}
			}
		}
	}
}

/// Handle returned by [`Registry::observe`]: reads the current value
/// and cancels this registration.
#[derive(Clone)]
pub struct Subscription {
	body: Rc<ObserverBody>,
	callback: PropertyCallback,
}

impl Subscription {
	pub fn get(&self) -> Value {
		self.body.current()
	}

	pub(crate) fn write(&self, value: Value, silent: bool) {
		self.body.write(value, silent);
	}

	pub fn cancel(&self) -> bool {
		match self.body.registry.upgrade() {
			Some(registry) => registry.remove(self.body.addr, &self.body.key, &self.callback),
			None => false,
		}
	}
}
