//! Tab management.
//!
//! `TabManager` keeps an ordered set of open tabs and at most one active
//! tab id. Once mounted on the bus it opens tabs for `open-tab` events and
//! focuses module tabs when the context names a module.

mod manager;

pub use manager::{module_tab_id, Tab, TabManager, MODULE_TAB_PREFIX};
