//! Interactive target resolution.
//!
//! [`TargetSelector::resolve`] drives a small state machine over one
//! [`TargetCatalog`]:
//!
//! - `Page(type)` lists the targets of one type, a "no target" choice and
//!   navigation to every other populated type (and to the namespace browser
//!   when the listing supports namespaces).
//! - `NamespaceBrowser` lists the other namespaces. Picking one re-lists and
//!   returns to automatic page selection.
//! - `Unresolved` is used when no supported type has targets.
//!
//! The loop ends with a concrete target, an explicit "no target" pick, or a
//! dismissed prompt. The last two both run targetless; only the dismissal is
//! announced to the user.

use super::{
    catalog::{TargetCatalog, TargetSource},
    picker::{PickItem, PickRequest, Picker},
    store::{KeyValueStore, StoreScope},
};
use crate::{
    constants::LAST_TARGET_KEY,
    error::ExecutionError,
    notifications::{NotificationSink, notify},
    protocol::NotificationLevel,
};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionState {
    Page(String),
    NamespaceBrowser,
    Unresolved,
}

/// Terminal output of the selection loop. `path: None` means targetless.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserSelection {
    pub path: Option<String>,
    pub namespace: Option<String>,
}

impl UserSelection {
    pub fn targetless(namespace: Option<&str>) -> Self {
        Self {
            path: None,
            namespace: namespace.map(str::to_string),
        }
    }
}

/// One entry of a selection prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionChoice {
    Target(String),
    NoTarget,
    ShowType(String),
    BrowseNamespaces,
    Namespace(String),
}

impl SelectionChoice {
    fn item(&self, last_target: Option<&str>, current_namespace: Option<&str>) -> PickItem {
        match self {
            SelectionChoice::Target(path) if Some(path.as_str()) == last_target => {
                PickItem::new(path).with_description("last used")
            }
            SelectionChoice::Target(path) => PickItem::new(path),
            SelectionChoice::NoTarget => PickItem::new("No Target (\"targetless\")")
                .with_description("Run locally without impersonating a remote target"),
            SelectionChoice::ShowType(ty) => PickItem::new(format!("Show {}s", capitalize(ty))),
            SelectionChoice::BrowseNamespaces => {
                let item = PickItem::new("Select Another Namespace");
                match current_namespace {
                    Some(ns) => item.with_description(format!("current: {ns}")),
                    None => item,
                }
            }
            SelectionChoice::Namespace(ns) => PickItem::new(ns),
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub struct TargetSelector {
    source: Arc<dyn TargetSource>,
    picker: Arc<dyn Picker>,
    store: Arc<dyn KeyValueStore>,
    notifier: Arc<dyn NotificationSink>,
    supported_types: Vec<String>,
    last_target: Option<String>,
}

impl TargetSelector {
    /// Reads the last selected target once: workspace scope first, then global.
    pub fn new(
        source: Arc<dyn TargetSource>,
        picker: Arc<dyn Picker>,
        store: Arc<dyn KeyValueStore>,
        notifier: Arc<dyn NotificationSink>,
        supported_types: Vec<String>,
    ) -> Self {
        let last_target = [StoreScope::Workspace, StoreScope::Global]
            .into_iter()
            .find_map(|scope| match store.get(scope, LAST_TARGET_KEY) {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!("Failed to read last selected target ({:?}): {}", scope, e);
                    None
                }
            });
        tracing::debug!("Last selected target: {:?}", last_target);

        Self {
            source,
            picker,
            store,
            notifier,
            supported_types,
            last_target,
        }
    }

    pub fn last_target(&self) -> Option<&str> {
        self.last_target.as_deref()
    }

    /// List targets, keeping only available targets of supported types.
    pub async fn list(&self, namespace: Option<&str>) -> Result<TargetCatalog, ExecutionError> {
        let catalog = self
            .source
            .list(namespace)
            .await
            .map_err(ExecutionError::ListFailure)?
            .filtered(&self.supported_types);
        tracing::debug!(
            "Listed {} targets (namespace {:?})",
            catalog.targets().len(),
            catalog.current_namespace()
        );
        Ok(catalog)
    }

    /// Page of the last selected target's type when populated, else the first populated type.
    pub fn initial_state(&self, catalog: &TargetCatalog) -> SelectionState {
        let last_type = self
            .last_target
            .as_deref()
            .and_then(|path| path.split_once('/').map(|(ty, _)| ty));
        if let Some(ty) = last_type
            && catalog.has_type(ty)
        {
            return SelectionState::Page(ty.to_string());
        }
        match catalog.types_with_targets(&self.supported_types).first() {
            Some(ty) => SelectionState::Page(ty.to_string()),
            None => SelectionState::Unresolved,
        }
    }

    /// Choices offered in `state`, in display order.
    pub fn choices(&self, state: &SelectionState, catalog: &TargetCatalog) -> Vec<SelectionChoice> {
        let mut choices = Vec::new();
        match state {
            SelectionState::Page(active) => {
                let last = self.last_target.as_deref();
                let (mut page, rest): (Vec<_>, Vec<_>) = catalog
                    .targets_of_type(active)
                    .map(|t| t.path.as_str())
                    .partition(|path| Some(*path) == last);
                page.extend(rest);
                choices.extend(page.into_iter().map(|p| SelectionChoice::Target(p.to_string())));
                choices.push(SelectionChoice::NoTarget);
                choices.extend(
                    catalog
                        .types_with_targets(&self.supported_types)
                        .into_iter()
                        .filter(|ty| *ty != active.as_str())
                        .map(|ty| SelectionChoice::ShowType(ty.to_string())),
                );
                if can_browse_namespaces(catalog) {
                    choices.push(SelectionChoice::BrowseNamespaces);
                }
            }
            SelectionState::NamespaceBrowser => {
                if let Some(info) = catalog.namespaces() {
                    choices.extend(info.others().map(|ns| SelectionChoice::Namespace(ns.to_string())));
                }
            }
            SelectionState::Unresolved => {
                choices.push(SelectionChoice::NoTarget);
                if can_browse_namespaces(catalog) {
                    choices.push(SelectionChoice::BrowseNamespaces);
                }
            }
        }
        choices
    }

    /// Run the selection loop to a terminal choice.
    ///
    /// A prompt failure is reported as [`ExecutionError::SelectionAborted`];
    /// a listing failure as [`ExecutionError::ListFailure`].
    pub async fn resolve(&self) -> Result<UserSelection, ExecutionError> {
        let mut catalog = self.list(None).await?;
        let mut state = self.initial_state(&catalog);

        loop {
            tracing::debug!("Selection state: {:?}", state);
            let choices = self.choices(&state, &catalog);
            let request = PickRequest {
                title: title(&state, &catalog),
                items: choices
                    .iter()
                    .map(|c| c.item(self.last_target.as_deref(), catalog.current_namespace()))
                    .collect(),
            };

            let picked = self
                .picker
                .pick(request)
                .await
                .map_err(|e| ExecutionError::SelectionAborted(e.to_string()))?;

            let Some(index) = picked else {
                tracing::info!("Target selection dismissed, running targetless");
                notify(
                    self.notifier.as_ref(),
                    NotificationLevel::Info,
                    "No target was selected, so the process will run targetless.",
                    Vec::new(),
                )
                .await;
                return Ok(UserSelection::targetless(catalog.current_namespace()));
            };

            let choice = choices.get(index).cloned().ok_or_else(|| {
                ExecutionError::SelectionAborted(format!("picker returned unknown choice {index}"))
            })?;

            match choice {
                SelectionChoice::Target(path) => {
                    self.remember(&path);
                    tracing::info!("Selected target {}", path);
                    return Ok(UserSelection {
                        path: Some(path),
                        namespace: catalog.current_namespace().map(str::to_string),
                    });
                }
                SelectionChoice::NoTarget => {
                    tracing::info!("Targetless run chosen");
                    return Ok(UserSelection::targetless(catalog.current_namespace()));
                }
                SelectionChoice::ShowType(ty) => state = SelectionState::Page(ty),
                SelectionChoice::BrowseNamespaces => state = SelectionState::NamespaceBrowser,
                SelectionChoice::Namespace(ns) => {
                    catalog = self.list(Some(&ns)).await?;
                    state = self.initial_state(&catalog);
                }
            }
        }
    }

    fn remember(&self, path: &str) {
        for scope in [StoreScope::Workspace, StoreScope::Global] {
            if let Err(e) = self.store.set(scope, LAST_TARGET_KEY, path) {
                tracing::warn!("Failed to persist last selected target ({:?}): {}", scope, e);
            }
        }
    }
}

// A single-namespace listing has nowhere to navigate to.
fn can_browse_namespaces(catalog: &TargetCatalog) -> bool {
    catalog
        .namespaces()
        .is_some_and(|info| info.others().next().is_some())
}

fn title(state: &SelectionState, catalog: &TargetCatalog) -> String {
    let scope = catalog
        .current_namespace()
        .map(|ns| format!(" (namespace: {ns})"))
        .unwrap_or_default();
    match state {
        SelectionState::Page(ty) => format!("Select a {ty} to run against{scope}"),
        SelectionState::NamespaceBrowser => format!("Select a namespace{scope}"),
        SelectionState::Unresolved => format!("No targets found{scope}"),
    }
}
