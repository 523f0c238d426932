pub use crate::app::{App, AppMessage, Emitter, Ref, WidgetId};
pub use crate::error::{Error, Result};
pub use crate::factory::Factory;
pub use crate::widget::{Widget, WidgetCtx};

mod app;
pub mod error;
mod factory;
mod widget;
