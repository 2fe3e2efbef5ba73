use relay_core::{
    constants::LAST_TARGET_KEY,
    error::ExecutionError,
    protocol::NotificationLevel,
    targets::{
        KeyValueStore, MemoryStore, NamespaceInfo, StoreScope, Target, TargetCatalog,
        TargetSelector, UserSelection,
    },
    test_utils::{
        RecordingNotificationSink, ScriptedAnswer, ScriptedPicker, StaticTargetSource,
        init_test_logging,
    },
};
use std::sync::Arc;

const NO_TARGET: &str = "No Target (\"targetless\")";

fn catalog(paths: &[&str]) -> TargetCatalog {
    TargetCatalog::new(paths.iter().map(|p| Target::new(*p, true)).collect(), None)
}

fn supported() -> Vec<String> {
    vec!["deployment".into(), "rollout".into(), "pod".into()]
}

struct Fixture {
    source: Arc<StaticTargetSource>,
    picker: Arc<ScriptedPicker>,
    store: Arc<MemoryStore>,
    sink: Arc<RecordingNotificationSink>,
}

impl Fixture {
    fn new(source: StaticTargetSource, answers: Vec<ScriptedAnswer>) -> Self {
        Self {
            source: Arc::new(source),
            picker: Arc::new(ScriptedPicker::new(answers)),
            store: Arc::new(MemoryStore::new()),
            sink: Arc::new(RecordingNotificationSink::new()),
        }
    }

    fn with_last_target(self, path: &str) -> Self {
        self.store
            .set(StoreScope::Workspace, LAST_TARGET_KEY, path)
            .unwrap();
        self
    }

    fn selector(&self) -> TargetSelector {
        TargetSelector::new(
            self.source.clone(),
            self.picker.clone(),
            self.store.clone(),
            self.sink.clone(),
            supported(),
        )
    }
}

#[tokio::test]
async fn test_initial_page_is_last_selected_type() {
    init_test_logging();
    let fx = Fixture::new(
        StaticTargetSource::new(catalog(&["pod/api-1", "deployment/web", "pod/api-2"])),
        vec![ScriptedAnswer::Dismiss],
    )
    .with_last_target("deployment/old");

    fx.selector().resolve().await.unwrap();

    assert_eq!(
        fx.picker.shown_labels()[0],
        ["deployment/web", NO_TARGET, "Show Pods"]
    );
}

#[tokio::test]
async fn test_initial_page_falls_back_to_priority_order() {
    let fx = Fixture::new(
        StaticTargetSource::new(catalog(&["pod/api-1", "deployment/web"])),
        vec![ScriptedAnswer::Dismiss],
    )
    .with_last_target("rollout/gone");

    fx.selector().resolve().await.unwrap();

    assert_eq!(
        fx.picker.shown_labels()[0],
        ["deployment/web", NO_TARGET, "Show Pods"]
    );
}

#[tokio::test]
async fn test_last_selected_target_is_sorted_first() {
    let fx = Fixture::new(
        StaticTargetSource::new(catalog(&["pod/a", "pod/b", "pod/c"])),
        vec![ScriptedAnswer::Dismiss],
    )
    .with_last_target("pod/b");

    fx.selector().resolve().await.unwrap();

    let request = &fx.picker.requests()[0];
    let labels: Vec<_> = request.items.iter().map(|i| i.label.as_str()).collect();
    assert_eq!(labels, ["pod/b", "pod/a", "pod/c", NO_TARGET]);
    assert_eq!(request.items[0].description.as_deref(), Some("last used"));
}

#[tokio::test]
async fn test_empty_catalog_is_one_prompt_with_only_no_target() {
    let fx = Fixture::new(
        StaticTargetSource::new(catalog(&[])),
        vec![ScriptedAnswer::label(NO_TARGET)],
    );

    let selection = fx.selector().resolve().await.unwrap();

    assert_eq!(selection, UserSelection::default());
    assert_eq!(fx.picker.shown_labels(), vec![vec![NO_TARGET.to_string()]]);
    assert!(fx.sink.notifications().is_empty());
}

#[tokio::test]
async fn test_empty_catalog_offers_namespace_browsing_when_supported() {
    let empty = TargetCatalog::new(
        vec![],
        Some(NamespaceInfo::new("dev", vec!["dev".into(), "prod".into()])),
    );
    let fx = Fixture::new(StaticTargetSource::new(empty), vec![ScriptedAnswer::Dismiss]);

    let selection = fx.selector().resolve().await.unwrap();

    assert_eq!(
        fx.picker.shown_labels(),
        vec![vec![NO_TARGET.to_string(), "Select Another Namespace".to_string()]]
    );
    assert_eq!(selection.namespace.as_deref(), Some("dev"));
}

#[tokio::test]
async fn test_unavailable_and_unsupported_targets_are_never_offered() {
    let listing = TargetCatalog::new(
        vec![
            Target::new("pod/down", false),
            Target::new("service/svc", true),
            Target::new("pod/up", true),
        ],
        None,
    );
    let fx = Fixture::new(StaticTargetSource::new(listing), vec![ScriptedAnswer::Dismiss]);

    fx.selector().resolve().await.unwrap();

    assert_eq!(fx.picker.shown_labels()[0], ["pod/up", NO_TARGET]);
}

#[tokio::test]
async fn test_concrete_pick_is_persisted_in_both_scopes() {
    let fx = Fixture::new(
        StaticTargetSource::new(catalog(&["pod/api-1"])),
        vec![ScriptedAnswer::label("pod/api-1")],
    );

    let selection = fx.selector().resolve().await.unwrap();

    assert_eq!(
        selection,
        UserSelection {
            path: Some("pod/api-1".into()),
            namespace: None
        }
    );
    for scope in [StoreScope::Workspace, StoreScope::Global] {
        assert_eq!(
            fx.store.get(scope, LAST_TARGET_KEY).unwrap().as_deref(),
            Some("pod/api-1")
        );
    }
}

#[tokio::test]
async fn test_navigation_between_type_pages() {
    let fx = Fixture::new(
        StaticTargetSource::new(catalog(&["pod/api-1", "rollout/canary", "deployment/web"])),
        vec![
            ScriptedAnswer::label("Show Rollouts"),
            ScriptedAnswer::label("rollout/canary"),
        ],
    );

    let selection = fx.selector().resolve().await.unwrap();

    assert_eq!(selection.path.as_deref(), Some("rollout/canary"));
    let shown = fx.picker.shown_labels();
    assert_eq!(
        shown[0],
        ["deployment/web", NO_TARGET, "Show Rollouts", "Show Pods"]
    );
    assert_eq!(
        shown[1],
        ["rollout/canary", NO_TARGET, "Show Deployments", "Show Pods"]
    );
}

#[tokio::test]
async fn test_namespace_switch_relists_and_reselects_page() {
    let dev = TargetCatalog::new(
        vec![Target::new("pod/api-1", true)],
        Some(NamespaceInfo::new("dev", vec!["dev".into(), "prod".into()])),
    );
    let prod = TargetCatalog::new(
        vec![Target::new("deployment/web", true)],
        Some(NamespaceInfo::new("prod", vec!["dev".into(), "prod".into()])),
    );
    let fx = Fixture::new(
        StaticTargetSource::new(dev).with_namespace(Some("prod"), prod),
        vec![
            ScriptedAnswer::label("Select Another Namespace"),
            ScriptedAnswer::label("prod"),
            ScriptedAnswer::label("deployment/web"),
        ],
    );

    let selection = fx.selector().resolve().await.unwrap();

    assert_eq!(
        selection,
        UserSelection {
            path: Some("deployment/web".into()),
            namespace: Some("prod".into())
        }
    );
    assert_eq!(fx.source.calls(), vec![None, Some("prod".to_string())]);
    assert_eq!(fx.picker.shown_labels()[1], ["prod"]);
}

#[tokio::test]
async fn test_dismissal_runs_targetless_with_notice() {
    let fx = Fixture::new(
        StaticTargetSource::new(catalog(&["pod/api-1"])),
        vec![ScriptedAnswer::Dismiss],
    );

    let selection = fx.selector().resolve().await.unwrap();

    assert_eq!(selection.path, None);
    let notices = fx.sink.notifications();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NotificationLevel::Info);
    assert_eq!(fx.store.get(StoreScope::Global, LAST_TARGET_KEY).unwrap(), None);
}

#[tokio::test]
async fn test_explicit_no_target_is_silent() {
    let fx = Fixture::new(
        StaticTargetSource::new(catalog(&["pod/api-1"])),
        vec![ScriptedAnswer::label(NO_TARGET)],
    );

    let selection = fx.selector().resolve().await.unwrap();

    assert_eq!(selection.path, None);
    assert!(fx.sink.notifications().is_empty());
}

#[tokio::test]
async fn test_picker_failure_is_selection_aborted() {
    let fx = Fixture::new(
        StaticTargetSource::new(catalog(&["pod/api-1"])),
        vec![ScriptedAnswer::Fail],
    );

    let err = fx.selector().resolve().await.unwrap_err();
    assert!(matches!(err, ExecutionError::SelectionAborted(_)));
}

#[tokio::test]
async fn test_listing_failure_is_list_failure() {
    // No catalog registered for the initial listing
    let fx = Fixture::new(StaticTargetSource::default(), vec![]);

    let err = fx.selector().resolve().await.unwrap_err();
    assert_eq!(err.kind(), "list_failure");
    assert!(fx.picker.requests().is_empty());
}
