use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

use nova_maven_registry::{
    ProjectRegistryManager, RefreshMonitor, RegistryConfig, PROJECT_CACHE_SIZE_ENV_VAR,
};
use parking_lot::Mutex;
use tracing::{field::Visit, Event, Level};
use tracing_subscriber::{layer::Context, prelude::*, Layer};

use super::support::*;

#[derive(Debug, Clone)]
struct CapturedEvent {
    level: Level,
    fields: HashMap<String, String>,
}

impl CapturedEvent {
    fn message(&self) -> &str {
        self.field("message")
    }

    fn field(&self, name: &str) -> &str {
        self.fields.get(name).map_or("", String::as_str)
    }
}

#[derive(Clone, Default)]
struct CapturingLayer {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl<S> Layer<S> for CapturingLayer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        self.events.lock().push(CapturedEvent {
            level: *event.metadata().level(),
            fields: visitor.fields,
        });
    }
}

#[derive(Default)]
struct FieldVisitor {
    fields: HashMap<String, String>,
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.fields
            .insert(field.name().to_string(), format!("{value:?}"));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.fields
            .insert(field.name().to_string(), value.to_string());
    }
}

fn capture<T>(f: impl FnOnce() -> T) -> (T, Vec<CapturedEvent>) {
    let layer = CapturingLayer::default();
    let events = layer.events.clone();
    let subscriber = tracing_subscriber::registry().with(layer);
    let out = tracing::subscriber::with_default(subscriber, f);
    let events = events.lock().clone();
    (out, events)
}

#[test]
fn unreadable_state_is_reported_as_warning() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("registry.json");
    fs::write(&path, b"{ not json").unwrap();
    let config = RegistryConfig {
        state_file: Some(path),
        ..RegistryConfig::default()
    };
    let workspace = lib_app_workspace();

    let (manager, events) =
        capture(|| ProjectRegistryManager::new(services(&workspace), config));

    assert!(manager.projects().is_empty());
    let warning = events
        .iter()
        .find(|event| event.message() == "ignoring unreadable registry state")
        .expect("warning event");
    // The subsystem travels as a `target` field, not as metadata.
    assert_eq!(warning.field("target"), "nova.maven.registry");
    assert_eq!(warning.level, Level::WARN);
    assert!(warning.fields.contains_key("path"));
}

#[test]
fn failed_reads_name_the_descriptor() {
    let workspace = FakeWorkspace::new();
    workspace.put("orphan", FakePom::child("orphan", "missing-parent"));
    let manager = manager(&workspace);

    let (result, events) = capture(|| manager.refresh(workspace.ids(), &RefreshMonitor::new()));

    assert!(result.unwrap().is_empty());
    let warning = events
        .iter()
        .find(|event| event.message() == "failed to read project")
        .expect("warning event");
    assert_eq!(warning.field("target"), "nova.maven.registry");
    assert_eq!(warning.field("pom"), id("orphan").as_str());
}

#[test]
fn invalid_cache_size_override_is_reported() {
    let prev = std::env::var_os(PROJECT_CACHE_SIZE_ENV_VAR);
    std::env::set_var(PROJECT_CACHE_SIZE_ENV_VAR, "lots");
    let (config, events) = capture(|| RegistryConfig::default().with_env_overrides());
    match prev {
        Some(value) => std::env::set_var(PROJECT_CACHE_SIZE_ENV_VAR, value),
        None => std::env::remove_var(PROJECT_CACHE_SIZE_ENV_VAR),
    }

    assert_eq!(config.project_cache_size, RegistryConfig::default().project_cache_size);
    let warning = events
        .iter()
        .find(|event| event.message() == "ignoring invalid project cache size override")
        .expect("warning event");
    assert_eq!(warning.level, Level::WARN);
    assert_eq!(warning.field("target"), "nova.maven.registry");
    assert_eq!(warning.field("var"), PROJECT_CACHE_SIZE_ENV_VAR);
}
