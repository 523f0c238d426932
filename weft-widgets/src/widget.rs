use weft_state::{Value, ValueMap};
use weft_vdom::NodeId;

use crate::app::{App, Ref, WidgetId};
use crate::error::Result;

/// A widget behaviour.
///
/// A widget names its template, declares the handlers templates may bind
/// with `t-on-*`, and overrides the lifecycle hooks it cares about. The
/// runtime owns the instance together with its state record; hooks reach
/// both through the [`WidgetCtx`].
pub trait Widget: 'static {
    /// The name of the template this widget renders
    fn template(&self) -> &str;

    /// Handler names that `t-on-*` may resolve against
    fn handlers(&self) -> &[&'static str] {
        &[]
    }

    fn initial_state(&self) -> ValueMap {
        ValueMap::new()
    }

    /// Awaited before the first render; no document mutation has
    /// happened yet anywhere in the subtree being mounted.
    fn will_start(&mut self, _ctx: &mut WidgetCtx<'_>) -> Result<()> {
        Ok(())
    }

    /// The widget's root entered the document
    fn mounted(&mut self, _ctx: &mut WidgetCtx<'_>) {}

    /// A re-render is about to patch the document
    fn will_patch(&mut self, _ctx: &mut WidgetCtx<'_>) {}

    /// The patch for a re-render was applied
    fn patched(&mut self, _ctx: &mut WidgetCtx<'_>) {}

    /// The widget is about to be detached
    fn will_unmount(&mut self, _ctx: &mut WidgetCtx<'_>) {}

    /// Dispatch for the handlers declared in [`Widget::handlers`]
    fn on_event(&mut self, _handler: &str, _args: &[Value], _ctx: &mut WidgetCtx<'_>) {}
}

/// Hook context: the widget's window onto the runtime while the
/// instance is checked out of its cell.
pub struct WidgetCtx<'a> {
    pub(crate) app: &'a mut App,
    pub(crate) id: WidgetId,
}

impl WidgetCtx<'_> {
    pub fn id(&self) -> WidgetId {
        self.id
    }

    pub fn state(&self) -> &ValueMap {
        self.app.state(self.id).expect("a cell outlives its hooks")
    }

    /// Merge a patch into the state and schedule a render for the next
    /// flush. Before the first render this only merges.
    pub fn update_state(&mut self, patch: ValueMap) {
        self.app.update_state(self.id, patch);
    }

    pub fn get_ref(&self, name: &str) -> Option<Ref> {
        self.app.refs(self.id)?.get(name).copied()
    }

    pub fn el(&self) -> Option<NodeId> {
        self.app.el(self.id)
    }

    pub fn next_id(&self) -> u64 {
        self.app.qweb().next_id()
    }

    /// The whole runtime, for hooks that create or mount widgets
    pub fn app(&mut self) -> &mut App {
        self.app
    }
}
