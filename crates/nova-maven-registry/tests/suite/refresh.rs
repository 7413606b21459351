use std::sync::Arc;

use nova_maven_registry::services::{
    DependencyResolver, InstalledArtifact, LifecycleMapping, LifecycleMappingResolver,
    LifecycleMappingResult, ResolutionOutput,
};
use nova_maven_registry::{
    Capability, ChangeKind, DefaultDependencyResolver, MarkerKind, MavenProject, MojoExecutionKey,
    Problem, ProjectFacade, RefreshMonitor, RefreshPhase, RefreshProgress, RegistryConfig,
    RegistryView, RequiredCapability, ResolutionError, ResolverConfiguration,
};
use nova_maven_registry::{ProjectRegistryManager, RegistryError};

use super::support::*;

#[test]
fn initial_refresh_adds_every_project() {
    let workspace = lib_app_workspace();
    let manager = manager(&workspace);

    let events = refresh_all(&manager, &workspace);

    assert_eq!(changed_ids(&events), vec![id("app"), id("lib"), id("root")]);
    assert!(events.iter().all(|event| event.kind == ChangeKind::Added));

    let registry = manager.registry();
    assert!(registry.is_valid());
    assert_eq!(registry.len(), 3);
    assert!(registry
        .requirements(&id("app"))
        .unwrap()
        .contains(&RequiredCapability::maven_artifact(&key("lib", "1.0"), None, false)));

    let app = manager.get_facade_by_key("org.example", "app", "1.0").unwrap();
    assert_eq!(app.descriptor(), &id("app"));
    assert_eq!(app.artifacts(), &[key("lib", "1.0")]);
}

#[test]
fn refreshing_unchanged_projects_is_idempotent() {
    let workspace = lib_app_workspace();
    let manager = manager(&workspace);
    refresh_all(&manager, &workspace);
    let before = manager.registry();

    let events = refresh_all(&manager, &workspace);

    assert!(events.is_empty(), "unexpected events: {events:?}");
    for facade in before.projects() {
        let current = manager.get_facade(facade.descriptor()).unwrap();
        assert!(ProjectFacade::same_instance(&facade, &current));
    }
    assert_same_registry(&before, &manager.registry());
}

#[test]
fn version_bump_of_lib_reaches_app() {
    let workspace = lib_app_workspace();
    let manager = manager(&workspace);
    refresh_all(&manager, &workspace);

    workspace.update("lib", |pom| pom.version = Some("2.0".to_string()));
    let events = manager
        .refresh([id("lib")], &RefreshMonitor::new())
        .unwrap();

    assert_eq!(changed_ids(&events), vec![id("app"), id("lib")]);
    assert!(events.iter().all(|event| event.kind == ChangeKind::Changed));

    let registry = manager.registry();
    let requirements = registry.requirements(&id("app")).unwrap();
    assert!(requirements.contains(&RequiredCapability::maven_artifact(&key("lib", "2.0"), None, false)));
    assert!(!requirements.contains(&RequiredCapability::maven_artifact(&key("lib", "1.0"), None, false)));
    assert!(manager.get_facade_by_key("org.example", "lib", "1.0").is_none());
    assert!(manager.get_facade_by_key("org.example", "lib", "2.0").is_some());
}

#[test]
fn parent_changes_propagate_through_children() {
    let workspace = FakeWorkspace::new();
    workspace.put("a", FakePom::new("a", "1.0").with_packaging("pom"));
    workspace.put("b", FakePom::child("b", "a"));
    workspace.put("c", FakePom::new("c", "1.0").with_dependency("b", "[1.0,3.0)"));
    let manager = manager(&workspace);
    refresh_all(&manager, &workspace);
    assert_eq!(manager.get_facade(&id("b")).unwrap().artifact_key(), &key("b", "1.0"));

    workspace.update("a", |pom| pom.version = Some("2.0".to_string()));
    let events = manager
        .refresh([id("a")], &RefreshMonitor::new())
        .unwrap();

    assert_eq!(changed_ids(&events), vec![id("a"), id("b"), id("c")]);
    assert_eq!(manager.get_facade(&id("b")).unwrap().artifact_key(), &key("b", "2.0"));
    assert_eq!(manager.get_facade(&id("c")).unwrap().artifacts(), &[key("b", "2.0")]);
    assert!(manager.registry().is_valid());
}

#[test]
fn ranges_resolve_against_projects_of_the_same_refresh() {
    let workspace = lib_app_workspace();
    let manager = manager(&workspace);

    // Structural reads leave app's range open; resolution pins it.
    manager
        .refresh([id("app"), id("lib"), id("root")], &RefreshMonitor::new())
        .unwrap();

    let app = manager.get_facade(&id("app")).unwrap();
    assert_eq!(app.artifacts(), &[key("lib", "1.0")]);
    let requirements = manager.registry().requirements(&id("app")).cloned().unwrap();
    assert_eq!(
        requirements.iter().collect::<Vec<_>>(),
        vec![&RequiredCapability::maven_artifact(&key("lib", "1.0"), None, false)]
    );

    let events = refresh_all(&manager, &workspace);
    assert!(events.is_empty(), "unexpected events: {events:?}");
}

#[test]
fn new_workspace_version_is_picked_up_by_ranges() {
    let workspace = lib_app_workspace();
    let manager = manager(&workspace);
    refresh_all(&manager, &workspace);

    workspace.put("lib-next", FakePom::new("lib", "1.5"));
    let events = manager
        .refresh([id("lib-next")], &RefreshMonitor::new())
        .unwrap();

    assert_eq!(changed_ids(&events), vec![id("app"), id("lib-next")]);
    let app = manager.get_facade(&id("app")).unwrap();
    assert_eq!(app.artifacts(), &[key("lib", "1.5")]);
    assert!(manager
        .registry()
        .requirements(&id("app"))
        .unwrap()
        .contains(&RequiredCapability::maven_artifact(&key("lib", "1.5"), None, false)));
}

#[test]
fn transitive_changes_report_unchanged_dependents() {
    let workspace = FakeWorkspace::new();
    workspace.put("a", FakePom::new("a", "1.0"));
    workspace.put("b", FakePom::new("b", "1.0").with_dependency("a", "[1.0,)"));
    workspace.put("c", FakePom::new("c", "1.0").with_dependency("b", "1.0"));
    let manager = manager(&workspace);
    refresh_all(&manager, &workspace);
    let c_before = manager.get_facade(&id("c")).unwrap();

    workspace.update("a", |pom| pom.version = Some("2.0".to_string()));
    let events = manager
        .refresh([id("a")], &RefreshMonitor::new())
        .unwrap();

    // c's own facade is equal, but b's resolution underneath it moved.
    assert_eq!(changed_ids(&events), vec![id("a"), id("b"), id("c")]);
    assert!(events.iter().all(|event| event.kind == ChangeKind::Changed));
    let c_after = manager.get_facade(&id("c")).unwrap();
    assert_eq!(*c_after, *c_before);
    assert_eq!(c_after.artifacts(), &[key("b", "1.0")]);
    assert_eq!(manager.get_facade(&id("b")).unwrap().artifacts(), &[key("a", "2.0")]);
}

#[test]
fn versioned_dependents_ignore_other_versions() {
    let workspace = FakeWorkspace::new();
    workspace.put("parent", FakePom::new("parent", "1.0").with_packaging("pom"));
    workspace.put(
        "child",
        FakePom::new("child", "1.0").with_parent("parent", Some("1.0")),
    );
    workspace.put("user", FakePom::new("user", "1.0").with_dependency("parent", "1.0"));
    let manager = manager(&workspace);
    refresh_all(&manager, &workspace);

    let registry = manager.registry();
    let parent_v2 = nova_maven_registry::Capability::maven_parent(&key("parent", "2.0"));
    assert!(registry.versioned_dependents(&parent_v2).is_empty());
    assert_eq!(
        registry.dependents(&parent_v2, true).into_iter().collect::<Vec<_>>(),
        vec![id("child")]
    );

    let parent_v1 = nova_maven_registry::Capability::maven_parent(&key("parent", "1.0"));
    assert_eq!(
        registry.versioned_dependents(&parent_v1).into_iter().collect::<Vec<_>>(),
        vec![id("child")]
    );
}

#[test]
fn child_read_before_parent_resolves_on_retry() {
    let workspace = FakeWorkspace::new();
    workspace.put("parent", FakePom::new("parent", "1.0").with_packaging("pom"));
    workspace.put("child", FakePom::child("child", "parent"));
    let markers = Arc::new(RecordingMarkers::default());
    let manager = ProjectRegistryManager::new(
        services(&workspace).with_markers(markers.clone()),
        RegistryConfig::default(),
    );

    let events = manager
        .refresh([id("child"), id("parent")], &RefreshMonitor::new())
        .unwrap();

    assert_eq!(changed_ids(&events), vec![id("child"), id("parent")]);
    assert_eq!(
        manager.get_facade(&id("child")).unwrap().parent(),
        Some(&key("parent", "1.0"))
    );
    assert!(markers.get(&id("child"), MarkerKind::PomLoading).is_empty());
}

#[test]
fn disabled_parent_removes_orphaned_children() {
    let workspace = FakeWorkspace::new();
    workspace.put("parent", FakePom::new("parent", "1.0").with_packaging("pom"));
    workspace.put(
        "child",
        FakePom::new("child", "1.0").with_parent("parent", Some("1.0")),
    );
    let markers = Arc::new(RecordingMarkers::default());
    let manager = ProjectRegistryManager::new(
        services(&workspace).with_markers(markers.clone()),
        RegistryConfig::default(),
    );
    refresh_all(&manager, &workspace);

    workspace.disable("parent");
    let events = manager
        .refresh([id("parent")], &RefreshMonitor::new())
        .unwrap();

    assert_eq!(changed_ids(&events), vec![id("child"), id("parent")]);
    assert!(events.iter().all(|event| event.kind == ChangeKind::Removed));

    let registry = manager.registry();
    assert!(registry.is_valid());
    assert!(registry.capabilities(&id("parent")).is_none());
    // The unparseable child keeps waiting for its parent.
    assert_eq!(
        registry.requirements(&id("child")).unwrap().iter().collect::<Vec<_>>(),
        vec![&RequiredCapability::maven_parent(&key("parent", "1.0"))]
    );
    let problems = markers.get(&id("child"), MarkerKind::PomLoading);
    assert!(problems[0].message.contains("Non-resolvable parent"));
}

#[test]
fn reenabled_parent_brings_back_waiting_child() {
    let workspace = FakeWorkspace::new();
    workspace.put("parent", FakePom::new("parent", "1.0").with_packaging("pom"));
    workspace.put(
        "child",
        FakePom::new("child", "1.0").with_parent("parent", Some("1.0")),
    );
    workspace.disable("parent");
    let manager = manager(&workspace);
    refresh_all(&manager, &workspace);
    assert!(manager.projects().is_empty());

    workspace.put("parent", FakePom::new("parent", "1.0").with_packaging("pom"));
    let events = manager
        .refresh([id("parent")], &RefreshMonitor::new())
        .unwrap();

    assert_eq!(changed_ids(&events), vec![id("child"), id("parent")]);
    assert!(events.iter().all(|event| event.kind == ChangeKind::Added));
}

#[test]
fn cancelled_refresh_leaves_registry_untouched() {
    let workspace = lib_app_workspace();
    let manager = manager(&workspace);
    let listener = Arc::new(RecordingListener::default());
    manager.add_listener(listener.clone());

    let monitor = RefreshMonitor::new();
    monitor.cancel();
    let err = manager.refresh(workspace.ids(), &monitor).unwrap_err();

    assert!(matches!(err, RegistryError::Cancelled));
    assert_eq!(manager.registry().version(), 0);
    assert!(manager.projects().is_empty());
    assert!(listener.batches().is_empty());
}

#[test]
fn listeners_only_hear_about_actual_changes() {
    let workspace = lib_app_workspace();
    let manager = manager(&workspace);
    let listener = Arc::new(RecordingListener::default());
    let handle: Arc<dyn nova_maven_registry::services::ChangeListener> = listener.clone();
    manager.add_listener(handle.clone());

    refresh_all(&manager, &workspace);
    refresh_all(&manager, &workspace);
    assert_eq!(listener.batches().len(), 1);
    assert_eq!(listener.batches()[0].len(), 3);

    manager.remove_listener(&handle);
    workspace.update("lib", |pom| pom.version = Some("2.0".to_string()));
    manager.refresh([id("lib")], &RefreshMonitor::new()).unwrap();
    assert_eq!(listener.batches().len(), 1);
}

#[test]
fn progress_reports_every_phase() {
    let workspace = lib_app_workspace();
    let manager = manager(&workspace);
    let mut monitor = RefreshMonitor::new();
    let mut rx = monitor.subscribe(64);

    manager.refresh(workspace.ids(), &monitor).unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert_eq!(events.first(), Some(&RefreshProgress::Begin { requested: 3 }));
    assert_eq!(events.last(), Some(&RefreshProgress::End { changed: 3 }));
    for phase in [RefreshPhase::Discovery, RefreshPhase::Resolution, RefreshPhase::Commit] {
        assert!(events.iter().any(|event| matches!(
            event,
            RefreshProgress::Descriptor { phase: p, .. } if *p == phase
        )));
    }
}

/// Reports every resolved `lib` as freshly installed into the local repository.
struct InstallingResolver;

impl DependencyResolver for InstallingResolver {
    fn resolve_project_dependencies(
        &self,
        facade: &ProjectFacade,
        project: &MavenProject,
        registry: &dyn RegistryView,
        output: &mut ResolutionOutput,
        monitor: &RefreshMonitor,
    ) -> Result<(), ResolutionError> {
        if facade.artifact_key().artifact_id == "lib" {
            output.installed.push(InstalledArtifact {
                base: facade.artifact_key().clone(),
                artifact: facade.artifact_key().clone(),
            });
        }
        DefaultDependencyResolver.resolve_project_dependencies(facade, project, registry, output, monitor)
    }
}

#[test]
fn installed_artifacts_refresh_their_dependents_once() {
    let workspace = FakeWorkspace::new();
    workspace.put("lib", FakePom::new("lib", "1.0"));
    workspace.put("app", FakePom::new("app", "1.0").with_dependency("lib", "1.0"));
    let manager = ProjectRegistryManager::new(
        services(&workspace).with_default_resolver(Arc::new(InstallingResolver)),
        RegistryConfig::default(),
    );
    refresh_all(&manager, &workspace);
    workspace.clear_reads();

    let events = manager
        .refresh([id("lib")], &RefreshMonitor::new())
        .unwrap();

    assert!(events.is_empty());
    let app_reads = workspace
        .reads()
        .into_iter()
        .filter(|read| read == &id("app"))
        .count();
    assert_eq!(app_reads, 1);
}

#[test]
fn unchanged_projects_are_not_reread() {
    let workspace = lib_app_workspace();
    let manager = manager(&workspace);
    refresh_all(&manager, &workspace);
    workspace.clear_reads();

    manager.refresh([id("root")], &RefreshMonitor::new()).unwrap();

    assert_eq!(workspace.reads(), vec![id("root")]);
}

#[derive(Debug)]
struct CustomMapping;

impl LifecycleMapping for CustomMapping {
    fn id(&self) -> &str {
        "custom"
    }

    fn dependency_resolver(&self) -> Option<Arc<dyn DependencyResolver>> {
        Some(Arc::new(FailingResolver))
    }
}

struct FailingResolver;

impl DependencyResolver for FailingResolver {
    fn resolve_project_dependencies(
        &self,
        facade: &ProjectFacade,
        _project: &MavenProject,
        _registry: &dyn RegistryView,
        _output: &mut ResolutionOutput,
        _monitor: &RefreshMonitor,
    ) -> Result<(), ResolutionError> {
        Err(ResolutionError {
            project: facade.artifact_key().to_string(),
            message: "repository offline".to_string(),
        })
    }
}

struct CustomMappings;

impl LifecycleMappingResolver for CustomMappings {
    fn calculate(
        &self,
        project: &MavenProject,
        _mojo_executions: &[MojoExecutionKey],
        _requested_id: Option<&str>,
    ) -> LifecycleMappingResult {
        if project.artifact_key.artifact_id != "app" {
            return LifecycleMappingResult::default();
        }
        LifecycleMappingResult {
            lifecycle_mapping_id: Some("custom".to_string()),
            mapping: Some(Arc::new(CustomMapping)),
            configurators: vec!["jdt".to_string()],
            problems: vec![Problem::warning("plugin execution not covered")],
            ..LifecycleMappingResult::default()
        }
    }
}

#[test]
fn lifecycle_mapping_selects_resolver_and_reports_problems() {
    let workspace = lib_app_workspace();
    let markers = Arc::new(RecordingMarkers::default());
    let manager = ProjectRegistryManager::new(
        services(&workspace)
            .with_markers(markers.clone())
            .with_lifecycle_mappings(Arc::new(CustomMappings)),
        RegistryConfig::default(),
    );

    refresh_all(&manager, &workspace);

    let app = manager.get_facade(&id("app")).unwrap();
    assert_eq!(app.lifecycle_mapping_id(), Some("custom"));
    assert_eq!(app.configurators(), &["jdt".to_string()]);
    assert_eq!(
        markers.get(&id("app"), MarkerKind::LifecycleMapping),
        vec![Problem::warning("plugin execution not covered")]
    );

    // The failing resolver leaves only structure requirements behind.
    let registry = manager.registry();
    assert!(registry.requirements(&id("app")).map_or(true, |set| set.is_empty()));
    let problems = markers.get(&id("app"), MarkerKind::DependencyResolution);
    assert!(problems[0].message.contains("repository offline"));
    assert!(markers
        .get(&id("lib"), MarkerKind::DependencyResolution)
        .is_empty());
}

/// Exports an import capability for every `pom`-packaged project.
struct BomResolver;

impl DependencyResolver for BomResolver {
    fn resolve_project_dependencies(
        &self,
        facade: &ProjectFacade,
        project: &MavenProject,
        registry: &dyn RegistryView,
        output: &mut ResolutionOutput,
        monitor: &RefreshMonitor,
    ) -> Result<(), ResolutionError> {
        if facade.packaging() == "pom" {
            output
                .capabilities
                .insert(Capability::maven_artifact_import(facade.artifact_key()));
        }
        DefaultDependencyResolver.resolve_project_dependencies(facade, project, registry, output, monitor)
    }
}

#[test]
fn extra_capability_changes_only_reach_versioned_dependents() {
    let workspace = FakeWorkspace::new();
    workspace.put("bom", FakePom::new("bom", "1.0"));
    workspace.put("app", FakePom::new("app", "1.0").with_import("bom", "1.0"));
    workspace.put("legacy", FakePom::new("legacy", "1.0").with_import("bom", "0.9"));
    let manager = ProjectRegistryManager::new(
        services(&workspace).with_default_resolver(Arc::new(BomResolver)),
        RegistryConfig::default(),
    );
    refresh_all(&manager, &workspace);
    workspace.clear_reads();

    workspace.update("bom", |pom| pom.packaging = "pom".to_string());
    let events = manager
        .refresh([id("bom")], &RefreshMonitor::new())
        .unwrap();

    assert_eq!(changed_ids(&events), vec![id("app"), id("bom")]);
    assert!(manager
        .registry()
        .capabilities(&id("bom"))
        .unwrap()
        .contains(&Capability::maven_artifact_import(&key("bom", "1.0"))));
    let reads = workspace.reads();
    assert!(reads.contains(&id("app")));
    assert!(!reads.contains(&id("legacy")), "legacy was read: {reads:?}");
}

#[test]
fn bom_version_bump_reaches_its_importers() {
    let workspace = FakeWorkspace::new();
    workspace.put("bom", FakePom::new("bom", "1.0").with_packaging("pom"));
    workspace.put("app", FakePom::new("app", "1.0").with_import("bom", "[1.0,)"));
    let manager = manager(&workspace);
    manager
        .refresh([id("bom"), id("app")], &RefreshMonitor::new())
        .unwrap();
    assert!(manager
        .registry()
        .requirements(&id("app"))
        .unwrap()
        .contains(&RequiredCapability::maven_artifact_import(&key("bom", "1.0"))));

    workspace.update("bom", |pom| pom.version = Some("2.0".to_string()));
    let events = manager
        .refresh([id("bom")], &RefreshMonitor::new())
        .unwrap();

    assert_eq!(changed_ids(&events), vec![id("app"), id("bom")]);
    let requirements = manager.registry().requirements(&id("app")).cloned().unwrap();
    assert!(requirements.contains(&RequiredCapability::maven_artifact_import(&key("bom", "2.0"))));
    assert!(!requirements.contains(&RequiredCapability::maven_artifact_import(&key("bom", "1.0"))));
}

#[test]
fn descriptors_are_read_in_batches_per_configuration() {
    let workspace = lib_app_workspace();
    let ci = ResolverConfiguration {
        active_profiles: vec!["ci".to_string()],
        ..ResolverConfiguration::new()
    };
    workspace.set_configuration("app", ci.clone());
    let manager = manager(&workspace);

    refresh_all(&manager, &workspace);

    let mut batches = workspace.batches();
    batches.sort_by_key(|(_, ids)| ids.len());
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0], (ci.clone(), vec![id("app")]));
    let (default, mut ids) = batches[1].clone();
    ids.sort();
    assert_eq!(default, ResolverConfiguration::new());
    assert_eq!(ids, vec![id("lib"), id("root")]);
    assert_eq!(
        manager.get_facade(&id("app")).unwrap().resolver_configuration(),
        &ci
    );
}
