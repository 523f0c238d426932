pub use crate::map::ValueMap;
pub use crate::value::Value;

mod map;
mod value;

/// Build a [`ValueMap`] in place.
/// ```
/// # use weft_state::record;
/// let state = record! { "counter" => 0, "name" => "bob" };
/// assert_eq!(state.len(), 2);
/// ```
#[macro_export]
macro_rules! record {
    () => { $crate::ValueMap::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::ValueMap::new();
        $(map.insert($key, $value);)+
        map
    }};
}
