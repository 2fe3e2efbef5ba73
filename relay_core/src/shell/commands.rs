//! Implementations of the `relay` sub-commands.

use super::cli::{Cli, LaunchArgs, OutputFormat, TargetsArgs};
use crate::{
    collaborators::{
        BinaryProvider, ConfigurationResolver, FixedBinaryProvider, PathBinaryProvider,
        WorkspaceConfigResolver,
    },
    config::RelaySettings,
    notifications::{NotificationSink, TerminalNotificationSink},
    orchestrator::Orchestrator,
    patcher::{LaunchConfiguration, LaunchContext, Patcher, prepare_launch},
    targets::{
        JsonFileStore, KeyValueStore, MemoryStore, TargetSelector, TerminalPicker, UserSelection,
    },
    tool::{ExternalTool, ToolTargetSource},
};
use anyhow::{Context, Result, anyhow};
use std::{
    collections::HashMap,
    io::Read,
    path::{Path, PathBuf},
    sync::Arc,
};

fn locate_binary(cli: &Cli) -> Result<PathBuf> {
    let provider: Box<dyn BinaryProvider> = match &cli.binary {
        Some(path) => Box::new(FixedBinaryProvider::new(path)),
        None => Box::new(PathBinaryProvider::default()),
    };
    let binary = provider.get()?;
    tracing::info!("Using external tool {}", binary.display());
    Ok(binary)
}

fn external_tool(cli: &Cli, settings: &RelaySettings) -> Result<Arc<ExternalTool>> {
    let binary = locate_binary(cli)?;
    Ok(Arc::new(
        ExternalTool::new(binary, settings.supported_target_types.clone())
            .with_timeout(settings.listing_timeout()),
    ))
}

fn last_target_store(workspace: &Path) -> Arc<dyn KeyValueStore> {
    match JsonFileStore::default_location() {
        Some(path) => Arc::new(JsonFileStore::new(path, workspace)),
        None => {
            tracing::warn!("No data directory available, last selected target will not persist");
            Arc::new(MemoryStore::new())
        }
    }
}

fn read_launch_configuration(path: &Path) -> Result<LaunchConfiguration> {
    let contents = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read launch configuration from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read launch configuration {}", path.display()))?
    };
    let value: serde_json::Value =
        serde_json::from_str(&contents).context("Launch configuration is not valid JSON")?;
    LaunchConfiguration::from_value(value)
        .ok_or_else(|| anyhow!("Launch configuration must be a JSON object"))
}

pub async fn launch(cli: &Cli, args: &LaunchArgs, settings: RelaySettings) -> Result<()> {
    let mut config = read_launch_configuration(&args.launch_config)?;
    let tool = external_tool(cli, &settings)?;
    let notifier: Arc<dyn NotificationSink> = Arc::new(TerminalNotificationSink);
    let resolver = WorkspaceConfigResolver;
    let env_overlay: HashMap<String, String> = args.env.iter().cloned().collect();

    let selection = args.target.as_ref().map(|target| UserSelection {
        path: Some(target.clone()),
        namespace: args.namespace.clone(),
    });

    let mut orchestrator = Orchestrator::new(tool.clone(), notifier.clone(), settings.clone());
    if selection.is_none() && !args.no_interactive {
        let mut hints = config.env();
        hints.extend(env_overlay.clone());
        let source = ToolTargetSource::new(tool, resolver.resolve(&args.workspace, &hints));
        let selector = TargetSelector::new(
            Arc::new(source),
            Arc::new(TerminalPicker),
            last_target_store(&args.workspace),
            notifier.clone(),
            settings.supported_target_types.clone(),
        );
        orchestrator = orchestrator.with_selector(Arc::new(selector));
    }

    let context = LaunchContext {
        workspace: args.workspace.clone(),
        selection,
        env_overlay,
    };
    prepare_launch(
        &mut config,
        &context,
        &resolver,
        &orchestrator,
        &Patcher::default(),
    )
    .await
    .context("Launch preparation failed")?;

    let rendered =
        serde_json::to_string_pretty(&config).context("Failed to serialize launch configuration")?;
    println!("{rendered}");
    Ok(())
}

pub async fn targets(cli: &Cli, args: &TargetsArgs, settings: RelaySettings) -> Result<()> {
    let tool = external_tool(cli, &settings)?;
    let config_path = WorkspaceConfigResolver.resolve(&args.workspace, &std::env::vars().collect());
    let catalog = tool
        .list_targets(config_path.as_deref(), args.namespace.as_deref())
        .await
        .context("Failed to list targets")?
        .filtered(&settings.supported_target_types);

    match args.format {
        OutputFormat::Json => {
            let rendered = serde_json::json!({
                "targets": catalog.targets(),
                "current_namespace": catalog.current_namespace(),
                "namespaces": catalog.namespaces().map(|ns| ns.all()),
            });
            println!("{}", serde_json::to_string_pretty(&rendered)?);
        }
        OutputFormat::Text => {
            if let Some(ns) = catalog.current_namespace() {
                println!("namespace: {ns}");
            }
            for ty in catalog.types_with_targets(&settings.supported_target_types) {
                println!("{ty}:");
                for target in catalog.targets_of_type(ty) {
                    println!("  {}", target.path);
                }
            }
            if catalog.targets().is_empty() {
                println!("no targets");
            }
        }
    }
    Ok(())
}

pub async fn version(cli: &Cli, settings: RelaySettings) -> Result<()> {
    let tool = external_tool(cli, &settings)?;
    let version = tool
        .version()
        .await
        .context("Failed to query the external tool version")?;
    println!("{version}");
    Ok(())
}
