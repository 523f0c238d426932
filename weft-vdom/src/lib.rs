pub use crate::dom::{Document, NodeId};
pub use crate::events::{Dispatch, HandlerRef, Listener, Modifiers};
pub use crate::node::{AttrValue, Attributes, FRAGMENT_SEL, Key, VComment, VElement, VNode, VText, is_bool_attr};
pub use crate::patch::{NoHooks, PatchHooks, RemoveHandle};

mod dom;
mod events;
mod node;
pub mod patch;
