//! Single-choice prompt used by the selection loop.

use async_trait::async_trait;
use dialoguer::{Select, console::style, theme::ColorfulTheme};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickItem {
    pub label: String,
    pub description: Option<String>,
}

impl PickItem {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickRequest {
    pub title: String,
    pub items: Vec<PickItem>,
}

#[derive(Debug, thiserror::Error)]
pub enum PickerError {
    #[error("Prompt failed: {0}")]
    Prompt(#[from] dialoguer::Error),

    #[error("Prompt task failed: {0}")]
    Task(String),
}

/// Shows a list and returns the chosen index, or `None` when dismissed.
#[async_trait]
pub trait Picker: Send + Sync {
    async fn pick(&self, request: PickRequest) -> Result<Option<usize>, PickerError>;
}

/// Terminal prompt. Escape or `q` dismisses.
#[derive(Debug, Default)]
pub struct TerminalPicker;

#[async_trait]
impl Picker for TerminalPicker {
    async fn pick(&self, request: PickRequest) -> Result<Option<usize>, PickerError> {
        tokio::task::spawn_blocking(move || {
            let labels: Vec<String> = request
                .items
                .iter()
                .map(|item| match &item.description {
                    Some(description) => format!("{}  {}", item.label, style(description).dim()),
                    None => item.label.clone(),
                })
                .collect();
            Select::with_theme(&ColorfulTheme::default())
                .with_prompt(request.title)
                .items(&labels)
                .default(0)
                .interact_opt()
                .map_err(PickerError::from)
        })
        .await
        .map_err(|e| PickerError::Task(e.to_string()))?
    }
}
