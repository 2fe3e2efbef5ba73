#![cfg(unix)]

use relay_core::{
    error::{ExitDisposition, ToolError},
    targets::TargetSource,
    test_utils::{emit_stderr, emit_stdout, init_test_logging, write_fake_tool},
    tool::{ExternalTool, ToolTargetSource, ToolVersion, VerifiedConfig},
};
use serial_test::serial;
use std::{sync::Arc, time::Duration};
use tempfile::TempDir;

fn types() -> Vec<String> {
    vec!["deployment".into(), "rollout".into(), "pod".into()]
}

#[tokio::test]
#[serial]
async fn test_rich_listing_with_namespaces() {
    init_test_logging();
    let dir = TempDir::new().unwrap();
    let listing = r#"{"targets":[{"path":"pod/api-1","available":true},{"path":"pod/api-2","available":false},{"path":"deployment/web"}],"current_namespace":"dev","namespaces":["dev","prod"]}"#;
    let body = format!(
        "if [ \"$RELAY_LS_RICH_OUTPUT\" != true ]; then exit 3; fi\n{}",
        emit_stdout(&[listing])
    );
    let binary = write_fake_tool(dir.path(), &body).unwrap();

    let catalog = ExternalTool::new(&binary, types())
        .list_targets(None, None)
        .await
        .unwrap();

    assert_eq!(catalog.targets().len(), 3);
    assert!(!catalog.targets()[1].available);
    assert!(catalog.targets()[2].available);
    assert_eq!(catalog.current_namespace(), Some("dev"));
    assert_eq!(
        catalog.namespaces().unwrap().others().collect::<Vec<_>>(),
        ["prod"]
    );
}

#[tokio::test]
#[serial]
async fn test_legacy_listing_and_listing_arguments() {
    let dir = TempDir::new().unwrap();
    let args_file = dir.path().join("args.txt");
    let body = format!(
        "printf '%s\\n' \"$@\" \"$RELAY_LS_TARGET_TYPES\" > \"{}\"\n{}",
        args_file.display(),
        emit_stdout(&[r#"["pod/api-1","service/svc"]"#])
    );
    let binary = write_fake_tool(dir.path(), &body).unwrap();
    let config = dir.path().join("relay.json");

    let source = ToolTargetSource::new(
        Arc::new(ExternalTool::new(&binary, types())),
        Some(config.clone()),
    );
    let catalog = source.list(Some("staging")).await.unwrap();

    assert_eq!(catalog.targets().len(), 2);
    assert!(catalog.namespaces().is_none());
    let recorded = std::fs::read_to_string(&args_file).unwrap();
    assert_eq!(
        recorded.lines().collect::<Vec<_>>(),
        [
            "ls",
            "-f",
            &*config.to_string_lossy(),
            "-n",
            "staging",
            r#"["deployment","rollout","pod"]"#
        ]
    );
}

#[tokio::test]
#[serial]
async fn test_failed_call_prefers_sentinel_message() {
    let dir = TempDir::new().unwrap();
    let body = format!(
        "{}exit 4",
        emit_stderr(&[
            "connecting...",
            r#"Error: {"message":"no cluster access","help":"check kubeconfig"}"#
        ])
    );
    let binary = write_fake_tool(dir.path(), &body).unwrap();

    let err = ExternalTool::new(&binary, types())
        .list_targets(None, None)
        .await
        .unwrap_err();

    match err {
        ToolError::Failed {
            command,
            status,
            message,
        } => {
            assert_eq!(command, "ls");
            assert_eq!(status, ExitDisposition::Code(4));
            assert_eq!(message, "no cluster access");
        }
        other => panic!("expected Failed, got {other:?}"),
    }
}

#[tokio::test]
#[serial]
async fn test_undecodable_listing() {
    let dir = TempDir::new().unwrap();
    let binary = write_fake_tool(dir.path(), "echo 'not json'").unwrap();

    let err = ExternalTool::new(&binary, types())
        .list_targets(None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::Decode { .. }));
}

#[tokio::test]
#[serial]
async fn test_auxiliary_call_timeout() {
    let dir = TempDir::new().unwrap();
    let binary = write_fake_tool(dir.path(), "exec sleep 30").unwrap();

    let err = ExternalTool::new(&binary, types())
        .with_timeout(Duration::from_millis(300))
        .version()
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::Timeout { .. }));
}

#[tokio::test]
#[serial]
async fn test_version() {
    let dir = TempDir::new().unwrap();
    let binary = write_fake_tool(dir.path(), "echo 'relay-agent 3.12.1-rc.2'").unwrap();

    let version = ExternalTool::new(&binary, types()).version().await.unwrap();
    assert_eq!(
        version,
        ToolVersion {
            major: 3,
            minor: 12,
            patch: 1
        }
    );
}

#[tokio::test]
#[serial]
async fn test_verify_config_outcomes() {
    let dir = TempDir::new().unwrap();
    let body = r#"case "$3" in
*pinned*)
echo '{"type":"Success","config":{"target":{"path":"pod/api-1","namespace":"dev"}},"warnings":["deprecated key"]}'
;;
*)
echo '{"type":"Fail","errors":["unknown field"]}'
;;
esac"#;
    let binary = write_fake_tool(dir.path(), body).unwrap();
    let tool = ExternalTool::new(&binary, types());

    let pinned = tool
        .verify_config(&dir.path().join("pinned.json"))
        .await
        .unwrap();
    let target = pinned.pinned_target().unwrap();
    assert_eq!(target.path.as_deref(), Some("pod/api-1"));
    assert_eq!(target.namespace.as_deref(), Some("dev"));

    let failed = tool
        .verify_config(&dir.path().join("broken.json"))
        .await
        .unwrap();
    assert!(matches!(failed, VerifiedConfig::Fail { errors } if errors == ["unknown field"]));
}
