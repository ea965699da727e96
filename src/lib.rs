//! Observe the value at the end of a property path such as `a.b.c` on
//! a dynamic object graph. Callbacks fire exactly once per actual
//! resolved-value change, even when the change comes from swapping an
//! intermediate object rather than the final property.

pub mod macros;

mod addr;
mod link;
mod observer;
mod path;
mod value;

pub use observer::{PropertyCallback, Registry, Subscription};
pub use path::{ChangeCallback, Path};
pub use value::{Descriptor, Getter, Key, Object, Setter, Value};

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum Error {
	/// The property's descriptor has `configurable: false`; it can
	/// never be instrumented. Raised at `observe` time, before any
	/// descriptor is touched.
	#[error("property `{0}` is not configurable")]
	NotConfigurable(Key),

	/// `observe`/`unobserve` was given a falsy or non-object root.
	#[error("a path root must be a non-null object")]
	InvalidRoot,
}
