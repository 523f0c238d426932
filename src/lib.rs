//! A reactive widget runtime with XML templates and a virtual DOM.
//!
//! Templates compile once into programs, programs render into vnode
//! trees, and the patcher reconciles those trees against an in-memory
//! document. The widget layer drives the lifecycle: mount, coalesced
//! state updates, and destruction.
pub use {
    weft_state as state,         // values
    weft_store as store,         // storage
    weft_templates as templates, // templates
    weft_vdom as vdom,           // vdom
    weft_widgets as widgets,     // widgets
};

pub mod prelude {
    pub use crate::state::{Value, ValueMap, record};
    pub use crate::templates::{Context, Extra, QWeb};
    pub use crate::vdom::{Document, NodeId, VNode};
    pub use crate::widgets::{App, Ref, Widget, WidgetCtx, WidgetId};
}
