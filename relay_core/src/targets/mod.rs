//! # Target Catalog & Selection
//!
//! - **`catalog`**: listed targets, namespace capability, `ls` output decoding
//!   and the [`TargetSource`] seam.
//! - **`selection`**: the paginated, namespace-aware selection loop.
//! - **`store`**: persistence of the last selected target.
//! - **`picker`**: the single-choice prompt the loop suspends on.

pub mod catalog;
pub mod picker;
pub mod selection;
pub mod store;

pub use catalog::{NamespaceInfo, Target, TargetCatalog, TargetSource, parse_listing};
pub use picker::{PickItem, PickRequest, Picker, PickerError, TerminalPicker};
pub use selection::{SelectionChoice, SelectionState, TargetSelector, UserSelection};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore, StoreScope};
