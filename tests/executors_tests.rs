//! Integration tests for the reference executors
//!
//! Tests reading environment variables MUST run serially.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use serial_test::serial;
use tagbind::executors::{register_builtin, ConfigExecutor, DefaultExecutor, CONFIG_FILE};
use tagbind::{BindError, MapSource, Namespace, Options, Record, Resolver, Schema};
use tempfile::TempDir;

fn builtin() -> Arc<Namespace> {
    let ns = Arc::new(Namespace::new());
    register_builtin(&ns).unwrap();
    ns
}

fn bound<T: Record>() -> Resolver {
    Resolver::with_options::<T>(&Options::new().namespace(builtin())).unwrap()
}

// ============================================================================
// env
// ============================================================================

#[derive(Debug, Default, PartialEq)]
struct EnvConfig {
    workspace: String,
    user: String,
    debug: String,
    port: u16,
}

impl Record for EnvConfig {
    fn describe(schema: &mut Schema<Self>) {
        schema
            .field("Workspace", "env=TAGBIND_TEST_HOME", |c| &mut c.workspace)
            .field("User", "env=TAGBIND_TEST_USER", |c| &mut c.user)
            .field("Debug", "env=TAGBIND_TEST_DEBUG", |c| &mut c.debug)
            .field("Port", "env=TAGBIND_TEST_PORT_ALT,TAGBIND_TEST_PORT;default=8080", |c| {
                &mut c.port
            });
    }
}

#[test]
#[serial]
fn test_env_reader() {
    std::env::set_var("TAGBIND_TEST_HOME", "/home/ada/.tagbind");
    std::env::set_var("TAGBIND_TEST_USER", "ada");
    std::env::remove_var("TAGBIND_TEST_DEBUG");
    std::env::remove_var("TAGBIND_TEST_PORT_ALT");
    std::env::set_var("TAGBIND_TEST_PORT", "9000");

    let config: EnvConfig = bound::<EnvConfig>().resolve_as(&Options::new()).unwrap();
    assert_eq!(
        config,
        EnvConfig {
            workspace: "/home/ada/.tagbind".into(),
            user: "ada".into(),
            debug: String::new(),
            port: 9000,
        }
    );

    std::env::remove_var("TAGBIND_TEST_PORT");
    let config: EnvConfig = bound::<EnvConfig>().resolve_as(&Options::new()).unwrap();
    assert_eq!(config.port, 8080);
}

#[test]
#[serial]
fn test_env_parse_error_names_field() {
    std::env::set_var("TAGBIND_TEST_PORT", "not-a-port");
    std::env::remove_var("TAGBIND_TEST_PORT_ALT");

    let err = bound::<EnvConfig>().resolve().unwrap_err();
    let BindError::Resolve(resolve_err) = &err else {
        panic!("expected resolve error, got {err}");
    };
    assert_eq!(resolve_err.path_string(), "Port");
    assert!(err.to_string().contains("not-a-port"), "{err}");

    std::env::remove_var("TAGBIND_TEST_PORT");
}

// ============================================================================
// config
// ============================================================================

#[derive(Debug, Default)]
struct WorkspaceConfig {
    root: String,
    owner: String,
    permission: String,
}

impl Record for WorkspaceConfig {
    fn describe(schema: &mut Schema<Self>) {
        schema
            .field("Root", "config=workspace.root", |w| &mut w.root)
            .field("Owner", "config=workspace.owner", |w| &mut w.owner)
            .field("Permission", "config=workspace.permission", |w| &mut w.permission);
    }
}

#[derive(Debug, Default)]
struct AppConfig {
    workspace: Option<Box<WorkspaceConfig>>,
    admin: String,
    debug: bool,
    retries: u32,
}

impl Record for AppConfig {
    fn describe(schema: &mut Schema<Self>) {
        schema
            .boxed("Workspace", "", |c| &mut c.workspace)
            .field("Admin", "config=admin", |c| &mut c.admin)
            .field("Debug", "config=debug", |c| &mut c.debug)
            .field("Retries", "config=retries;default=3", |c| &mut c.retries);
    }
}

fn write_config(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("config.json");
    fs::write(
        &path,
        r#"{
            "workspace.root": "$HOME/.tagbind",
            "workspace.owner": "ada",
            "workspace.permission": "0755",
            "admin": "ada",
            "debug": true
        }"#,
    )
    .unwrap();
    path
}

#[test]
#[serial]
fn test_config_loader_with_env_override() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir);
    let resolver = bound::<AppConfig>();
    let options = Options::new().value(CONFIG_FILE, path);

    let config: AppConfig = resolver.resolve_as(&options).unwrap();
    let workspace = config.workspace.unwrap();
    assert_eq!(workspace.root, "$HOME/.tagbind");
    assert_eq!(workspace.owner, "ada");
    assert_eq!(workspace.permission, "0755");
    assert_eq!(config.admin, "ada");
    assert!(config.debug);
    assert_eq!(config.retries, 3);

    let exe = ConfigExecutor::new("TAGBIND");
    std::env::set_var(exe.override_var("workspace.root"), "/srv/tagbind");
    std::env::set_var(exe.override_var("admin"), "grace");

    let config: AppConfig = resolver.resolve_as(&options).unwrap();
    assert_eq!(config.workspace.unwrap().root, "/srv/tagbind");
    assert_eq!(config.admin, "grace");

    std::env::remove_var(exe.override_var("workspace.root"));
    std::env::remove_var(exe.override_var("admin"));
}

#[test]
#[serial]
fn test_config_loader_reports_bad_files() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.json");
    fs::write(&path, "{ not json").unwrap();

    let mut config = AppConfig::default();
    let err = bound::<AppConfig>()
        .resolve_to_with(&mut config, &Options::new().value(CONFIG_FILE, path))
        .unwrap_err();

    // Every config-backed field fails on its own
    let BindError::Aggregate(aggregate) = err else {
        panic!("expected aggregate error");
    };
    assert_eq!(aggregate.len(), 6);
    assert!(aggregate.to_string().contains("parse config file"));
}

#[test]
#[serial]
fn test_config_file_parsed_once_until_it_changes() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir);
    let exe = ConfigExecutor::new("TAGBIND");
    let ns = Arc::new(Namespace::new());
    ns.register("config", exe.clone()).unwrap();
    ns.register("default", DefaultExecutor).unwrap();
    let resolver = Resolver::with_options::<AppConfig>(&Options::new().namespace(ns)).unwrap();
    let options = Options::new().value(CONFIG_FILE, path.clone());

    assert_eq!(exe.cached_files(), 0);
    let config: AppConfig = resolver.resolve_as(&options).unwrap();
    assert_eq!(config.admin, "ada");
    assert_eq!(exe.cached_files(), 1);

    let _: AppConfig = resolver.resolve_as(&options).unwrap();
    assert_eq!(exe.cached_files(), 1);

    // A different size invalidates the cached copy
    fs::write(&path, r#"{"admin": "grace-hopper", "retries": 7}"#).unwrap();
    let config: AppConfig = resolver.resolve_as(&options).unwrap();
    assert_eq!(config.admin, "grace-hopper");
    assert_eq!(config.retries, 7);
    assert_eq!(exe.cached_files(), 1);
}

#[test]
#[serial]
fn test_config_without_file_falls_back_to_defaults() {
    let config: AppConfig = bound::<AppConfig>().resolve_as(&Options::new()).unwrap();
    assert_eq!(config.admin, "");
    assert_eq!(config.retries, 3);
}

// ============================================================================
// form + default
// ============================================================================

#[derive(Debug, Default, PartialEq)]
struct SearchForm {
    keyword: String,
    tags: Vec<String>,
    page: Option<u32>,
    exact: bool,
}

impl Record for SearchForm {
    fn describe(schema: &mut Schema<Self>) {
        schema
            .field("Keyword", "form=q,keyword", |s| &mut s.keyword)
            .field("Tags", "form=tag", |s| &mut s.tags)
            .field("Page", "form=page;default=1", |s| &mut s.page)
            .field("Exact", "form=exact", |s| &mut s.exact);
    }
}

#[test]
fn test_form_reads_first_present_key() {
    let source = MapSource::new()
        .with("keyword", "tagbind")
        .with("tag", "rust")
        .with("tag", "binding")
        .with("exact", "true");

    let form: SearchForm = bound::<SearchForm>()
        .resolve_as(&Options::new().source(source))
        .unwrap();

    assert_eq!(
        form,
        SearchForm {
            keyword: "tagbind".into(),
            tags: vec!["rust".into(), "binding".into()],
            page: Some(1),
            exact: true,
        }
    );
}

#[test]
fn test_form_without_source_uses_defaults() {
    let form: SearchForm = bound::<SearchForm>().resolve_as(&Options::new()).unwrap();
    assert_eq!(form.page, Some(1));
    assert!(form.tags.is_empty());
}
