//! retext: apply a named instruction to the selected text in any
//! application and replace the selection with the result.

pub mod actions;
pub mod completion;
pub mod desktop;
pub mod history;
pub mod input;
pub mod presentation;
pub mod secure_keys;
pub mod selection;
pub mod settings;
pub mod shortcut;
pub mod store;
pub mod transforms;
