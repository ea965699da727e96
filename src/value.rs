use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::rc::{Rc, Weak};

use fxhash::FxHashMap;

/// A property key: a string or an opaque symbol minted by [`Key::symbol`].
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
	Str(Rc<str>),
	Symbol(u64),
}

thread_local! {
	static NEXT_SYMBOL: Cell<u64> = Cell::new(0);
}

impl Key {
	/// Mints a fresh key that is distinct from every string key and
	/// every previously minted symbol.
	pub fn symbol() -> Key {
		NEXT_SYMBOL.with(|next| {
			let id = next.get();
			next.set(id + 1);
			Key::Symbol(id)
		})
	}
}

impl From<&str> for Key {
	fn from(name: &str) -> Self {
		Key::Str(Rc::from(name))
	}
}

impl From<String> for Key {
	fn from(name: String) -> Self {
		Key::Str(Rc::from(name.as_str()))
	}
}

impl std::fmt::Display for Key {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Key::Str(name) => write!(f, "{}", name),
			Key::Symbol(id) => write!(f, "Symbol({})", id),
		}
	}
}

impl Debug for Key {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		std::fmt::Display::fmt(self, f)
	}
}

/// A dynamically typed value. Equality is strict-identity: primitives
/// compare by value (`NaN != NaN`), strings by content, objects by
/// pointer identity.
#[derive(Clone)]
pub enum Value {
	Undefined,
	Null,
	Bool(bool),
	Int(i64),
	Float(f64),
	Str(Rc<str>),
	Object(Object),
}

impl Value {
	pub fn is_undefined(&self) -> bool {
		matches!(self, Value::Undefined)
	}

	pub fn is_truthy(&self) -> bool {
		match self {
			Value::Undefined | Value::Null => false,
			Value::Bool(b) => *b,
			Value::Int(n) => *n != 0,
			Value::Float(n) => *n != 0.0 && !n.is_nan(),
			Value::Str(s) => !s.is_empty(),
			Value::Object(_) => true,
		}
	}

	pub fn as_object(&self) -> Option<&Object> {
		match self {
			Value::Object(object) => Some(object),
			_ => None,
		}
	}
}

impl PartialEq for Value {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Value::Undefined, Value::Undefined) => true,
			(Value::Null, Value::Null) => true,
			(Value::Bool(a), Value::Bool(b)) => a == b,
			(Value::Int(a), Value::Int(b)) => a == b,
			(Value::Float(a), Value::Float(b)) => a == b,
			(Value::Str(a), Value::Str(b)) => a == b,
			(Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
			_ => false,
		}
	}
}

impl Debug for Value {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Value::Undefined => write!(f, "undefined"),
			Value::Null => write!(f, "null"),
			Value::Bool(b) => b.fmt(f),
			Value::Int(n) => n.fmt(f),
			Value::Float(n) => n.fmt(f),
			Value::Str(s) => write!(f, "{:?}", s),
			Value::Object(object) => object.fmt(f),
		}
	}
}

impl From<bool> for Value {
	fn from(value: bool) -> Self {
		Value::Bool(value)
	}
}

impl From<i64> for Value {
	fn from(value: i64) -> Self {
		Value::Int(value)
	}
}

impl From<i32> for Value {
	fn from(value: i32) -> Self {
		Value::Int(value as i64)
	}
}

impl From<f64> for Value {
	fn from(value: f64) -> Self {
		Value::Float(value)
	}
}

impl From<&str> for Value {
	fn from(value: &str) -> Self {
		Value::Str(Rc::from(value))
	}
}

impl From<Object> for Value {
	fn from(value: Object) -> Self {
		Value::Object(value)
	}
}

pub type Getter = Rc<dyn Fn(&Object) -> Value>;
pub type Setter = Rc<dyn Fn(&Object, Value)>;

/// A property descriptor in the shape of `Object.defineProperty`:
/// either a data slot (`value` + `writable`) or an accessor pair.
#[derive(Clone)]
pub struct Descriptor {
	pub value: Option<Value>,
	pub get: Option<Getter>,
	pub set: Option<Setter>,
	pub writable: bool,
	pub enumerable: bool,
	pub configurable: bool,
}

impl Descriptor {
	pub fn data(value: Value) -> Descriptor {
		Descriptor {
			value: Some(value),
			get: None,
			set: None,
			writable: true,
			enumerable: true,
			configurable: true,
		}
	}

	pub fn accessor(get: Option<Getter>, set: Option<Setter>) -> Descriptor {
		Descriptor {
			value: None,
			get,
			set,
			writable: false,
			enumerable: true,
			configurable: true,
		}
	}

	pub fn is_accessor(&self) -> bool {
		self.get.is_some() || self.set.is_some()
	}
}

impl PartialEq for Descriptor {
	fn eq(&self, other: &Self) -> bool {
		fn same<T: ?Sized>(a: &Option<Rc<T>>, b: &Option<Rc<T>>) -> bool {
			match (a, b) {
				(Some(a), Some(b)) => Rc::ptr_eq(a, b),
				(None, None) => true,
				_ => false,
			}
		}

		self.value == other.value
			&& same(&self.get, &other.get)
			&& same(&self.set, &other.set)
			&& self.writable == other.writable
			&& self.enumerable == other.enumerable
			&& self.configurable == other.configurable
	}
}

impl Debug for Descriptor {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Descriptor")
			.field("value", &self.value)
			.field("get", &self.get.is_some())
			.field("set", &self.set.is_some())
			.field("writable", &self.writable)
			.field("enumerable", &self.enumerable)
			.field("configurable", &self.configurable)
			.finish()
	}
}

/// A shared, mutable bag of properties. Cloning an `Object` clones the
/// handle, not the properties; two clones compare equal under
/// [`Value::eq`].
#[derive(Clone)]
pub struct Object {
	inner: Rc<RefCell<ObjectInner>>,
}

pub struct ObjectInner {
	properties: FxHashMap<Key, Descriptor>,
}

impl Object {
	pub fn new() -> Object {
		Object {
			inner: Rc::new(RefCell::new(ObjectInner {
				properties: FxHashMap::default(),
			})),
		}
	}

	pub(crate) fn from_inner(inner: Rc<RefCell<ObjectInner>>) -> Object {
		Object { inner }
	}

	pub fn ptr_eq(&self, other: &Object) -> bool {
		Rc::ptr_eq(&self.inner, &other.inner)
	}

	pub(crate) fn addr(&self) -> usize {
		Rc::as_ptr(&self.inner) as *const () as usize
	}

	pub(crate) fn downgrade(&self) -> Weak<RefCell<ObjectInner>> {
		Rc::downgrade(&self.inner)
	}

	/// Reads a property, running its getter if it has one. Absent
	/// properties read as `Undefined`.
	pub fn get(&self, key: &Key) -> Value {
		let slot = self.inner.borrow().properties.get(key).cloned();
		match slot {
			None => Value::Undefined,
			Some(descriptor) => match descriptor.get {
				// The getter runs with no borrow held, so it may
				// freely touch this object again.
				Some(get) => get(self),
				None => descriptor.value.unwrap_or(Value::Undefined),
			},
		}
	}

	/// Writes a property, running its setter if it has one. Writes to a
	/// get-only accessor are silently inert; assignment to an absent
	/// key creates a plain data property.
	pub fn set(&self, key: &Key, value: impl Into<Value>) {
		let value = value.into();
		let slot = self.inner.borrow().properties.get(key).cloned();
		match slot {
			Some(descriptor) if descriptor.is_accessor() => {
				if let Some(set) = descriptor.set {
					set(self, value);
				}
			}
			Some(descriptor) => {
				if descriptor.writable {
					if let Some(slot) = self.inner.borrow_mut().properties.get_mut(key) {
						slot.value = Some(value);
					}
				}
			}
			None => {
				self.inner
					.borrow_mut()
					.properties
					.insert(key.clone(), Descriptor::data(value));
			}
		}
	}

	/// Installs `descriptor` under `key`, replacing whatever was there.
	/// This is the raw primitive; configurability checks belong to the
	/// caller.
	pub fn define(&self, key: &Key, descriptor: Descriptor) {
		self.inner
			.borrow_mut()
			.properties
			.insert(key.clone(), descriptor);
	}

	pub fn descriptor(&self, key: &Key) -> Option<Descriptor> {
		self.inner.borrow().properties.get(key).cloned()
	}

	pub fn remove(&self, key: &Key) -> bool {
		self.inner.borrow_mut().properties.remove(key).is_some()
	}

	pub fn has(&self, key: &Key) -> bool {
		self.inner.borrow().properties.contains_key(key)
	}
}

impl Default for Object {
	fn default() -> Self {
		Object::new()
	}
}

impl Debug for Object {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "Object({:p})", Rc::as_ptr(&self.inner))
	}
}
