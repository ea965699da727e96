use std::cell::RefCell;
use std::rc::Rc;

use crate::observer::{PropertyCallback, Registry, Subscription};
use crate::value::{Key, Object, Value};
use crate::Error;

/// Immutable per-segment data, built terminal-first and shared by
/// every chain the owning path spawns. A flyweight: no per-root state
/// lives here.
pub(crate) struct Segment {
	pub key: Key,
	pub next: Option<Rc<Segment>>,
}

impl Segment {
	/// Folds `keys` into a linked template, outermost segment first.
	pub fn template(keys: &[Key]) -> Rc<Segment> {
		let mut next = None;
		for key in keys.iter().rev() {
			next = Some(Rc::new(Segment {
				key: key.clone(),
				next,
			}));
		}
		next.expect("a path needs at least one segment")
	}
}

/// Receives the chain's new resolved value whenever any link below the
/// path observes a change. The path decides whether the change is
/// externally visible.
pub(crate) type ChainSink = Rc<dyn Fn(&Value)>;

/// One segment of one chain: observes its segment on the object it is
/// currently attached to and owns the link for the next segment. The
/// next link exists for the life of the chain even while detached
/// because an intermediate value is missing.
#[derive(Clone)]
pub(crate) struct Link {
	body: Rc<LinkBody>,
}

struct LinkBody {
	segment: Rc<Segment>,
	registry: Rc<Registry>,
	sink: ChainSink,
	next: Option<Link>,
	state: RefCell<LinkState>,
}

struct LinkState {
	subscription: Option<Subscription>,
	/// Raw value of this segment on the attached target, kept to
	/// dedup change notifications at this layer too.
	value: Value,
}

impl Link {
	/// Instantiates the full chain for one root, every link sharing
	/// the same sink.
	pub fn chain(segment: Rc<Segment>, registry: Rc<Registry>, sink: ChainSink) -> Link {
		let next = segment
			.next
			.clone()
			.map(|next| Link::chain(next, registry.clone(), sink.clone()));

		Link {
			body: Rc::new(LinkBody {
				segment,
				registry,
				sink,
				next,
				state: RefCell::new(LinkState {
					subscription: None,
					value: Value::Undefined,
				}),
			}),
		}
	}

	/// Instruments `target`'s segment and resolves the subtree value:
	/// the raw value for a terminal link, the recursive attachment of
	/// the next link for an object value, `Undefined` for a broken
	/// path. Attaching an attached link detaches it first.
	pub fn attach(&self, target: &Object) -> Result<Value, Error> {
		self.detach();

		let callback: PropertyCallback = {
			let this = Rc::downgrade(&self.body);
			Rc::new(move |_object, value| {
				if let Some(body) = this.upgrade() {
					Link { body }.changed(value);
				}
			})
		};

		let subscription = self
			.body
			.registry
			.observe(target, &self.body.segment.key, callback)?;

		let raw = subscription.get();

		{
			let mut state = self.body.state.borrow_mut();
			state.subscription = Some(subscription);
			state.value = raw.clone();
		}

		self.resolve(&raw)
	}

	fn resolve(&self, raw: &Value) -> Result<Value, Error> {
		let next = match &self.body.next {
			None => return Ok(raw.clone()),
			Some(next) => next,
		};

		match raw.as_object() {
			Some(object) => next.attach(object),
			None => {
				next.detach();
				Ok(Value::Undefined)
			}
		}
	}

	/// Removes this link's instrumentation and recursively detaches
	/// the rest of the chain. Idempotent.
	pub fn detach(&self) {
		let subscription = {
			let mut state = self.body.state.borrow_mut();
			state.value = Value::Undefined;
			state.subscription.take()
		};

		if let Some(subscription) = subscription {
			subscription.cancel();
		}

		if let Some(next) = &self.body.next {
			next.detach();
		}
	}

	/// Change handler for this segment. Rebuilds the chain suffix when
	/// an intermediate object was swapped, then hands the new resolved
	/// value to the sink.
	fn changed(&self, raw: &Value) {
		{
			let state = self.body.state.borrow();
			if state.subscription.is_none() {
				// A write raced through a callback after this link was
				// torn down; nothing to propagate.
				return;
			}
			if state.value == *raw {
				return;
			}
		}

		self.body.state.borrow_mut().value = raw.clone();

		let resolved = match self.resolve(raw) {
			Ok(resolved) => resolved,
			Err(error) => {
				// The handler has no error channel; a property that
				// became unobservable mid-path reads as a broken chain.
				tracing::warn!(key = %self.body.segment.key, %error, "re-attach failed");
				Value::Undefined
			}
		};

		(self.body.sink)(&resolved);
	}

	/// Writes through the terminal link's subscription and keeps its
	/// raw-value cache in sync with the write. Returns `false` when the
	/// chain is not currently attached end-to-end.
	pub fn write_terminal(&self, value: Value, silent: bool) -> bool {
		if let Some(next) = &self.body.next {
			return next.write_terminal(value, silent);
		}

		let subscription = match self.body.state.borrow().subscription.clone() {
			Some(subscription) => subscription,
			None => return false,
		};

		subscription.write(value.clone(), silent);

		if silent {
			// The observer suppressed its callbacks, so `changed` never
			// saw this write; sync the cache directly or the next real
			// transition back to the old value would be swallowed.
			self.body.state.borrow_mut().value = value;
		}

		true
	}
}
