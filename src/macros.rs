pub use enclose::*;

/// Builds an [`Object`](crate::Object) literal:
///
/// ```
/// use pathbind::object;
/// let root = object! { a: object! { b: 7 } };
/// ```
#[macro_export]
macro_rules! object {
	( $( $key:ident : $value:expr ),* $(,)? ) => {{
		let object = $crate::Object::new();
		$( object.set(&$crate::Key::from(stringify!($key)), $value); )*
		object
	}};
}

/// Wraps a change closure into the [`ChangeCallback`](crate::ChangeCallback)
/// the path API expects, with optional enclose-style capture.
#[macro_export]
macro_rules! callback {
	(( $($d_tt:tt)* ) ($old:ident, $new:ident) => $($b:tt)*) => {{
		let callback: $crate::ChangeCallback = ::std::rc::Rc::new($crate::macros::enclose!(
			($( $d_tt )*) move |$old: &$crate::Value, $new: &$crate::Value| { $($b)* }
		));
		callback
	}};
	(($old:ident, $new:ident) => $($b:tt)*) => {{
		let callback: $crate::ChangeCallback =
			::std::rc::Rc::new(move |$old: &$crate::Value, $new: &$crate::Value| { $($b)* });
		callback
	}};
}
