mod support;

use std::fs;

use tempfile::TempDir;

use stitch_core::error::ErrorKind;
use stitch_core::mcp::{ServerSpec, Transport};

use support::{backups_in, default_registry, write_file};

#[test]
fn stdio_spec_round_trips_through_every_target() {
    let tmp = TempDir::new().expect("tempdir should succeed");
    let registry = default_registry(&tmp);
    let spec = ServerSpec::stdio("fs", "npx", vec!["-y".into(), "server-fs".into()])
        .with_env("ROOT", "/srv");

    for target in registry.all() {
        target
            .configure(&spec, true)
            .unwrap_or_else(|e| panic!("{} configure failed: {}", target.id(), e));
        assert_eq!(
            target.get_server("fs", None),
            Some(spec.clone()),
            "{} round trip",
            target.id()
        );
        assert_eq!(target.list_servers(None), vec!["fs"], "{}", target.id());
        assert!(target.validate(), "{} validates its own output", target.id());
    }
}

#[test]
fn bearer_credential_round_trips_through_remote_targets() {
    let tmp = TempDir::new().expect("tempdir should succeed");
    let registry = default_registry(&tmp);
    let spec = ServerSpec::remote("api", Transport::Http, "https://api.example.com/mcp")
        .with_header("X-Org", "acme")
        .with_bearer("tok-1");

    for id in ["claude-code", "codex", "vscode", "gemini-cli"] {
        let target = registry.get(id).expect("registered");
        target.configure(&spec, false).expect("configure");
        assert_eq!(target.get_server("api", None), Some(spec.clone()), "{}", id);
    }
}

#[test]
fn invalid_spec_fails_precondition_and_leaves_file_unchanged() {
    let tmp = TempDir::new().expect("tempdir should succeed");
    let registry = default_registry(&tmp);

    let mut spec = ServerSpec::stdio("bad", "npx", vec![]);
    spec.endpoint = Some("https://x/mcp".to_string());

    for target in registry.all() {
        let path = target.detect(None).expect("path");
        write_file(&path, "");
        let before = fs::read(&path).expect("read");

        let err = target.configure(&spec, true).expect_err("invalid combination");
        assert_eq!(err.kind(), ErrorKind::Precondition, "{}", target.id());
        assert_eq!(fs::read(&path).expect("read"), before, "{}", target.id());
        assert!(backups_in(path.parent().expect("parent")).is_empty());
    }
}

#[test]
fn removing_unknown_id_is_not_found_and_file_unchanged() {
    let tmp = TempDir::new().expect("tempdir should succeed");
    let registry = default_registry(&tmp);
    let target = registry.get("codex").expect("registered");
    let path = tmp.path().join("home/.codex/config.toml");
    let original = "model = \"o3\"\n\n[mcp_servers.keep]\ncommand = \"x\"\n";
    write_file(&path, original);

    let err = target
        .remove(&ServerSpec::reference("missing"), true)
        .expect_err("nothing to remove");

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(fs::read_to_string(&path).expect("read"), original);
    assert!(backups_in(path.parent().expect("parent")).is_empty());
}

#[test]
fn codex_edit_keeps_comments_and_datetimes_verbatim() {
    let tmp = TempDir::new().expect("tempdir should succeed");
    let registry = default_registry(&tmp);
    let target = registry.get("codex").expect("registered");
    let path = tmp.path().join("home/.codex/config.toml");
    let original = "# my codex settings\nmodel = \"o3\" # fast\nlast_seen = 1979-05-27T07:32:00Z\n";
    write_file(&path, original);
    let spec = ServerSpec::stdio("fs", "npx", vec!["server-fs".into()]);

    target.configure(&spec, false).expect("configure");

    let configured = fs::read_to_string(&path).expect("read");
    assert!(configured.starts_with(original), "{configured}");
    assert!(configured.contains("[mcp_servers.fs]"));
    assert_eq!(target.get_server("fs", None), Some(spec.clone()));

    target.remove(&spec, false).expect("remove");
    assert_eq!(fs::read_to_string(&path).expect("read"), original);
}

#[test]
fn unreadable_configuration_lists_nothing() {
    let tmp = TempDir::new().expect("tempdir should succeed");
    let registry = default_registry(&tmp);
    let target = registry.get("gemini-cli").expect("registered");
    write_file(&tmp.path().join("home/.gemini/settings.json"), "{ not json");

    assert!(target.list_servers(None).is_empty());
    assert!(!target.has_server("fs", None));
    assert!(!target.validate());
}

#[test]
fn override_dir_wins_over_platform_paths() {
    let tmp = TempDir::new().expect("tempdir should succeed");
    let registry = default_registry(&tmp);
    let target = registry.get("claude-code").expect("registered");
    let override_dir = tmp.path().join("project");
    write_file(
        &override_dir.join(".claude.json"),
        r#"{"mcpServers":{"local":{"command":"x"}}}"#,
    );

    assert_eq!(
        target.detect(Some(&override_dir)),
        Some(override_dir.join(".claude.json"))
    );
    assert_eq!(target.list_servers(Some(&override_dir)), vec!["local"]);
    assert!(target.list_servers(None).is_empty());
}
