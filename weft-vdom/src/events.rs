use bitflags::bitflags;
use weft_state::Value;

bitflags! {
    /// Listener modifiers, declared as `t-on-<event>.<mod>` in templates.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Modifiers: u8 {
        /// Stop propagation once this node's listeners ran
        const STOP = 1;
        /// Mark the event as default-prevented
        const PREVENT = 1 << 1;
        /// Only fire when the node is the dispatch target
        const SELF_ONLY = 1 << 2;
    }
}

impl Modifiers {
    pub fn from_modifier_name(name: &str) -> Option<Self> {
        match name {
            "stop" => Some(Self::STOP),
            "prevent" => Some(Self::PREVENT),
            "self" => Some(Self::SELF_ONLY),
            _ => None,
        }
    }
}

/// A callable descriptor.
///
/// Listeners carry data, not closures: dispatch hands these back to the
/// runtime, which resolves `name` against the owning widget's handler
/// table. `owner` is the widget scope the listener was rendered for
/// (zero for context-only renders).
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerRef {
    pub owner: u64,
    pub name: String,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Listener {
    pub event: String,
    pub mods: Modifiers,
    pub handler: HandlerRef,
}

/// The outcome of dispatching an event against the document.
#[derive(Debug, Default)]
pub struct Dispatch {
    pub handlers: Vec<HandlerRef>,
    pub default_prevented: bool,
}
