use relay_core::{
    collaborators::WorkspaceConfigResolver,
    config::RelaySettings,
    constants::PROCESSED_SENTINEL_ENV,
    orchestrator::Orchestrator,
    patcher::{
        HostOs, LaunchConfiguration, LaunchContext, Patcher, is_already_processed, prepare_launch,
    },
    protocol::ExecutionResult,
    targets::UserSelection,
    test_utils::RecordingNotificationSink,
    tool::ExternalTool,
};
use serde_json::{Value, json};
use std::{collections::HashMap, path::PathBuf, sync::Arc};

fn config(value: Value) -> LaunchConfiguration {
    LaunchConfiguration::from_value(value).unwrap()
}

fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn result(environment: &[(&str, &str)]) -> ExecutionResult {
    ExecutionResult {
        environment: map(environment),
        ..Default::default()
    }
}

#[test]
fn test_env_merge_order_base_result_overlay() {
    let mut cfg = config(json!({"type": "node", "env": {"A": "1"}}));

    Patcher::new(HostOs::Other).patch(
        &mut cfg,
        &result(&[("A", "2"), ("B", "2")]),
        &map(&[("B", "3")]),
    );

    let mut env = cfg.env();
    env.remove(PROCESSED_SENTINEL_ENV);
    assert_eq!(env, map(&[("A", "2"), ("B", "3")]));
}

#[test]
fn test_unset_applies_after_merge() {
    let mut cfg = config(json!({"type": "python", "env": {"HTTP_PROXY": "http://proxy", "KEEP": "1"}}));
    let mut res = result(&[("NO_PROXY", "*")]);
    res.env_keys_to_unset = vec!["HTTP_PROXY".into(), "NO_PROXY".into()];

    Patcher::new(HostOs::Other).patch(&mut cfg, &res, &HashMap::new());

    assert_eq!(cfg.env_value("KEEP"), Some("1"));
    assert_eq!(cfg.env_value("HTTP_PROXY"), None);
    assert_eq!(cfg.env_value("NO_PROXY"), None);
}

#[test]
fn test_untouched_env_entries_keep_their_json_value() {
    let mut cfg = config(json!({
        "type": "node",
        "env": {"NODE_OPTIONS": null, "PORT": 8080, "A": "1", "HTTP_PROXY": null}
    }));
    let mut res = result(&[("A", "2")]);
    res.env_keys_to_unset = vec!["HTTP_PROXY".into()];

    Patcher::new(HostOs::Other).patch(&mut cfg, &res, &HashMap::new());

    let patched = cfg.into_value();
    assert_eq!(patched["env"]["NODE_OPTIONS"], Value::Null);
    assert_eq!(patched["env"]["PORT"], json!(8080));
    assert_eq!(patched["env"]["A"], "2");
    assert!(patched["env"].get("HTTP_PROXY").is_none());
    assert_eq!(patched["env"][PROCESSED_SENTINEL_ENV], "true");
}

#[test]
fn test_non_object_env_is_replaced() {
    let mut cfg = config(json!({"type": "node", "env": "A=1"}));

    Patcher::new(HostOs::Other).patch(&mut cfg, &result(&[("B", "2")]), &HashMap::new());

    let patched = cfg.into_value();
    assert_eq!(patched["env"]["B"], "2");
    assert_eq!(patched["env"][PROCESSED_SENTINEL_ENV], "true");
}

#[test]
fn test_patched_executable_replaces_field_on_macos() {
    let mut res = result(&[]);
    res.patched_executable_path = Some(PathBuf::from("/tmp/relay-patched/node"));

    let mut node = config(json!({"type": "node", "runtimeExecutable": "/usr/local/bin/node"}));
    Patcher::new(HostOs::MacOs).patch(&mut node, &res, &HashMap::new());
    assert_eq!(node.get_str("runtimeExecutable"), Some("/tmp/relay-patched/node"));

    let mut go = config(json!({"type": "go", "program": "/usr/local/bin/go"}));
    Patcher::new(HostOs::MacOs).patch(&mut go, &res, &HashMap::new());
    assert_eq!(go.get_str("program"), Some("/tmp/relay-patched/node"));

    let mut python = config(json!({"type": "debugpy"}));
    Patcher::new(HostOs::MacOs).patch(&mut python, &res, &HashMap::new());
    assert_eq!(python.get_str("python"), Some("/tmp/relay-patched/node"));
}

#[test]
fn test_patched_executable_ignored_elsewhere() {
    let mut res = result(&[]);
    res.patched_executable_path = Some(PathBuf::from("/tmp/relay-patched/node"));
    let mut cfg = config(json!({"type": "node", "runtimeExecutable": "/usr/local/bin/node"}));

    Patcher::new(HostOs::Other).patch(&mut cfg, &res, &HashMap::new());

    assert_eq!(cfg.get_str("runtimeExecutable"), Some("/usr/local/bin/node"));
}

#[test]
fn test_terminal_command_is_piped_through_patched_shell() {
    let mut res = result(&[("DYLD_INSERT_LIBRARIES", "/tmp/librelay.dylib")]);
    res.patched_executable_path = Some(PathBuf::from("/tmp/relay-patched/zsh"));
    let mut cfg = config(json!({"type": "node-terminal", "command": "npm run 'start'"}));

    Patcher::new(HostOs::MacOs).patch(&mut cfg, &res, &HashMap::new());

    assert_eq!(
        cfg.get_str("command"),
        Some(
            "echo 'npm run '\\''start'\\''' | DYLD_INSERT_LIBRARIES='/tmp/librelay.dylib' '/tmp/relay-patched/zsh'"
        )
    );
}

#[test]
fn test_processed_sentinel_is_set() {
    let mut cfg = config(json!({"type": "node"}));
    assert!(!is_already_processed(&cfg));

    Patcher::new(HostOs::Other).patch(&mut cfg, &result(&[]), &HashMap::new());

    assert!(is_already_processed(&cfg));
    assert_eq!(cfg.get_str("type"), Some("node"));
}

#[tokio::test]
async fn test_prepare_launch_skips_processed_configuration() {
    let dir = tempfile::TempDir::new().unwrap();
    let settings = RelaySettings::default();
    // Would fail with SpawnFailure if it were ever run
    let tool = Arc::new(ExternalTool::new(
        dir.path().join("missing"),
        settings.supported_target_types.clone(),
    ));
    let sink = Arc::new(RecordingNotificationSink::new());
    let orchestrator = Orchestrator::new(tool, sink.clone(), settings);

    let original = config(json!({"type": "node", "env": {PROCESSED_SENTINEL_ENV: "true"}}));
    let mut cfg = original.clone();
    let context = LaunchContext {
        workspace: dir.path().to_path_buf(),
        selection: Some(UserSelection::default()),
        env_overlay: HashMap::new(),
    };
    prepare_launch(
        &mut cfg,
        &context,
        &WorkspaceConfigResolver,
        &orchestrator,
        &Patcher::new(HostOs::Other),
    )
    .await
    .unwrap();

    assert_eq!(cfg, original);
    assert!(sink.events().is_empty());
}

#[tokio::test]
async fn test_prepare_launch_failure_leaves_configuration_untouched() {
    let dir = tempfile::TempDir::new().unwrap();
    let settings = RelaySettings::default();
    let tool = Arc::new(ExternalTool::new(
        dir.path().join("missing"),
        settings.supported_target_types.clone(),
    ));
    let orchestrator = Orchestrator::new(tool, Arc::new(RecordingNotificationSink::new()), settings);

    let original = config(json!({"type": "node", "env": {"A": "1"}}));
    let mut cfg = original.clone();
    let context = LaunchContext {
        workspace: dir.path().to_path_buf(),
        selection: Some(UserSelection::default()),
        env_overlay: map(&[("B", "2")]),
    };
    let err = prepare_launch(
        &mut cfg,
        &context,
        &WorkspaceConfigResolver,
        &orchestrator,
        &Patcher::new(HostOs::Other),
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), "spawn_failure");
    assert_eq!(cfg, original);
}

#[cfg(unix)]
#[tokio::test]
#[serial_test::serial]
async fn test_prepare_launch_end_to_end() {
    use relay_core::test_utils::{emit_stdout, finished_line, write_fake_tool};

    let dir = tempfile::TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join(".relay")).unwrap();
    std::fs::write(dir.path().join(".relay/relay.json"), "{}").unwrap();

    let mut res = result(&[("RELAY_AGENT_ADDR", "127.0.0.1:4000"), ("B", "from-result")]);
    res.env_keys_to_unset = vec!["HTTP_PROXY".into()];
    let body = format!(
        "printf '%s\\n' \"$@\" > \"{}\"\n{}",
        dir.path().join("args.txt").display(),
        emit_stdout(&[finished_line(&res)])
    );
    let binary = write_fake_tool(dir.path(), &body).unwrap();

    let settings = RelaySettings::default();
    let tool = Arc::new(ExternalTool::new(&binary, settings.supported_target_types.clone()));
    let orchestrator = Orchestrator::new(tool, Arc::new(RecordingNotificationSink::new()), settings);

    let mut cfg = config(json!({
        "type": "python",
        "python": "/usr/bin/python3",
        "env": {"HTTP_PROXY": "http://proxy", "A": "1"}
    }));
    let context = LaunchContext {
        workspace: dir.path().to_path_buf(),
        selection: Some(UserSelection {
            path: Some("pod/api-1".into()),
            namespace: None,
        }),
        env_overlay: map(&[("B", "from-caller")]),
    };
    prepare_launch(
        &mut cfg,
        &context,
        &WorkspaceConfigResolver,
        &orchestrator,
        &Patcher::new(HostOs::Other),
    )
    .await
    .unwrap();

    let args = std::fs::read_to_string(dir.path().join("args.txt")).unwrap();
    let config_path = dir.path().join(".relay/relay.json");
    assert_eq!(
        args.lines().collect::<Vec<_>>(),
        [
            "ext",
            "-t",
            "pod/api-1",
            "-f",
            &*config_path.to_string_lossy(),
            "-e",
            "/usr/bin/python3"
        ]
    );
    assert_eq!(cfg.env_value("A"), Some("1"));
    assert_eq!(cfg.env_value("B"), Some("from-caller"));
    assert_eq!(cfg.env_value("RELAY_AGENT_ADDR"), Some("127.0.0.1:4000"));
    assert_eq!(cfg.env_value("HTTP_PROXY"), None);
    assert!(is_already_processed(&cfg));
}
