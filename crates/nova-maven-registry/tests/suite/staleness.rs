use std::sync::Arc;

use nova_maven_registry::{
    MavenProject, ProjectFacade, RefreshMonitor, RegistryError, RegistryView,
    ResolverConfiguration,
};

use super::support::*;

fn facade(name: &str, version: &str) -> Arc<ProjectFacade> {
    Arc::new(ProjectFacade::new(
        id(name),
        &MavenProject::new(key(name, version)),
        ResolverConfiguration::new(),
        None,
    ))
}

#[test]
fn second_transaction_on_same_base_is_rejected() {
    let workspace = lib_app_workspace();
    let manager = manager(&workspace);
    let monitor = RefreshMonitor::new();

    let mut first = manager.new_mutable_registry();
    let mut second = manager.new_mutable_registry();
    first.set_project(&id("lib"), Some(facade("lib", "1.0"))).unwrap();
    second.set_project(&id("app"), Some(facade("app", "1.0"))).unwrap();

    let events = manager.apply_mutable_registry(first, &monitor).unwrap();
    assert_eq!(changed_ids(&events), vec![id("lib")]);

    assert!(second.is_stale());
    let err = second
        .set_project(&id("root"), Some(facade("root", "1.0")))
        .unwrap_err();
    assert!(err.is_stale());
    let err = manager.apply_mutable_registry(second, &monitor).unwrap_err();
    assert!(matches!(err, RegistryError::Stale));

    assert!(manager.get_facade(&id("app")).is_none());
}

#[test]
fn stale_state_cannot_be_refreshed() {
    let workspace = lib_app_workspace();
    let manager = manager(&workspace);
    let monitor = RefreshMonitor::new();

    let mut stale = manager.new_mutable_registry();
    refresh_all(&manager, &workspace);

    let execution = manager.create_execution_context(false);
    let err = manager
        .refresh_registry(&mut stale, [id("lib")], &execution, &monitor)
        .unwrap_err();
    assert!(err.is_stale());
}

#[test]
fn published_snapshots_never_change() {
    let workspace = lib_app_workspace();
    let manager = manager(&workspace);
    refresh_all(&manager, &workspace);
    let before = manager.registry();
    let version = before.version();

    workspace.update("lib", |pom| pom.version = Some("2.0".to_string()));
    manager.refresh([id("lib")], &RefreshMonitor::new()).unwrap();

    assert_eq!(before.version(), version);
    assert_eq!(
        before.facade(&id("lib")).unwrap().artifact_key(),
        &key("lib", "1.0")
    );
    assert!(manager.registry().version() > version);
    assert_eq!(
        manager.get_facade(&id("lib")).unwrap().artifact_key(),
        &key("lib", "2.0")
    );
}

#[test]
fn uncommitted_writes_are_invisible_to_readers() {
    let workspace = lib_app_workspace();
    let manager = manager(&workspace);

    let mut state = manager.new_mutable_registry();
    state.set_project(&id("lib"), Some(facade("lib", "1.0"))).unwrap();

    assert!(state.facade(&id("lib")).is_some());
    assert!(manager.get_facade(&id("lib")).is_none());
    assert_eq!(state.touched().collect::<Vec<_>>(), vec![&id("lib")]);
}
