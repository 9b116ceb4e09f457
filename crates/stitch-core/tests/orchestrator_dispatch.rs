mod support;

use std::fs;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tempfile::TempDir;

use stitch_core::client::{TargetRegistry, WriteMode};
use stitch_core::error::ErrorKind;
use stitch_core::mcp::{ServerSpec, Transport};
use stitch_core::orchestration::{ConfigureOptions, DispatchMode};

use support::{ScriptedTarget, default_registry, ids, orchestrator, write_file};

fn spec() -> ServerSpec {
    ServerSpec::stdio("fs", "npx", vec!["server-fs".into()])
}

fn scripted(targets: Vec<ScriptedTarget>) -> TargetRegistry {
    let mut registry = TargetRegistry::new();
    for target in targets {
        registry.register(Arc::new(target));
    }
    registry
}

#[tokio::test]
async fn slow_target_times_out_without_blocking_others() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let registry = scripted(vec![
        ScriptedTarget::new("slow", Duration::from_millis(600), Arc::clone(&calls)),
        ScriptedTarget::new("fast", Duration::ZERO, Arc::clone(&calls)),
    ]);
    let orchestrator = orchestrator(registry, Duration::from_millis(100), DispatchMode::Concurrent);

    let started = Instant::now();
    let outcomes = orchestrator
        .configure_all(&spec(), Some(&ids(&["slow", "fast"])), ConfigureOptions::default())
        .await
        .expect("batch should run");

    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(outcomes[0].target, "slow");
    assert!(!outcomes[0].success);
    assert_eq!(outcomes[0].error_kind, Some(ErrorKind::Timeout));
    assert_eq!(outcomes[1].target, "fast");
    assert!(outcomes[1].success);
}

#[tokio::test]
async fn write_finishing_after_timeout_is_rolled_back_later() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let slow = ScriptedTarget::new("slow", Duration::from_millis(300), Arc::clone(&calls));
    let slow_rollbacks = Arc::clone(&slow.rollbacks);
    let fast = ScriptedTarget::new("fast", Duration::ZERO, Arc::clone(&calls));
    let orchestrator = orchestrator(scripted(vec![slow, fast]), Duration::from_millis(50), DispatchMode::Concurrent);

    let outcomes = orchestrator
        .configure_all(
            &spec(),
            Some(&ids(&["slow", "fast"])),
            ConfigureOptions {
                rollback_on_failure: true,
                backup: true,
            },
        )
        .await
        .expect("batch should run");

    assert_eq!(outcomes[0].error_kind, Some(ErrorKind::Timeout));
    assert!(outcomes[0]
        .error
        .as_deref()
        .expect("timeout message")
        .contains("may still write"));
    assert!(outcomes[1].rolled_back);

    orchestrator.finish_late_rollbacks(Duration::from_secs(5)).await;
    assert_eq!(*slow_rollbacks.lock().expect("lock"), 1);
}

#[tokio::test]
async fn late_write_is_kept_without_rollback() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let slow = ScriptedTarget::new("slow", Duration::from_millis(150), Arc::clone(&calls));
    let slow_rollbacks = Arc::clone(&slow.rollbacks);
    let orchestrator = orchestrator(scripted(vec![slow]), Duration::from_millis(30), DispatchMode::Concurrent);

    let outcomes = orchestrator
        .configure_all(&spec(), Some(&ids(&["slow"])), ConfigureOptions::default())
        .await
        .expect("batch should run");
    assert_eq!(outcomes[0].error_kind, Some(ErrorKind::Timeout));

    orchestrator.finish_late_rollbacks(Duration::from_secs(1)).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(*slow_rollbacks.lock().expect("lock"), 0);
}

#[tokio::test]
async fn bridged_reflects_only_calls_that_ran_the_mapper() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut slow = ScriptedTarget::new("slow-stdio", Duration::from_millis(300), Arc::clone(&calls));
    slow.transports = &[Transport::Stdio];
    let mut fast = ScriptedTarget::new("fast-stdio", Duration::ZERO, Arc::clone(&calls));
    fast.transports = &[Transport::Stdio];
    let native = ScriptedTarget::new("native", Duration::ZERO, Arc::clone(&calls));
    let orchestrator = orchestrator(
        scripted(vec![slow, fast, native]),
        Duration::from_millis(50),
        DispatchMode::Concurrent,
    );
    let remote = ServerSpec::remote("api", Transport::Http, "https://api.example.com/mcp");

    let outcomes = orchestrator
        .configure_all(
            &remote,
            Some(&ids(&["slow-stdio", "fast-stdio", "native"])),
            ConfigureOptions::default(),
        )
        .await
        .expect("batch should run");

    assert_eq!(outcomes[0].error_kind, Some(ErrorKind::Timeout));
    assert!(!outcomes[0].bridged);
    assert!(outcomes[1].success);
    assert!(outcomes[1].bridged);
    assert!(!outcomes[2].bridged);
}

#[tokio::test]
async fn detection_timeout_reports_not_found() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let registry = scripted(vec![ScriptedTarget::new(
        "slow",
        Duration::from_millis(400),
        calls,
    )]);
    let orchestrator = orchestrator(registry, Duration::from_millis(50), DispatchMode::Concurrent);

    let outcomes = orchestrator.detect_all(None).await;

    assert_eq!(outcomes.len(), 1);
    assert!(!outcomes[0].success);
    assert_eq!(outcomes[0].found, Some(false));
    assert_eq!(outcomes[0].error_kind, Some(ErrorKind::Timeout));
}

#[tokio::test]
async fn results_follow_input_order_not_completion_order() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let registry = scripted(vec![
        ScriptedTarget::new("a", Duration::from_millis(150), Arc::clone(&calls)),
        ScriptedTarget::new("b", Duration::ZERO, Arc::clone(&calls)),
        ScriptedTarget::new("c", Duration::from_millis(50), Arc::clone(&calls)),
    ]);
    let orchestrator = orchestrator(registry, Duration::from_secs(5), DispatchMode::Concurrent);

    let outcomes = orchestrator
        .configure_all(&spec(), Some(&ids(&["c", "a", "b"])), ConfigureOptions::default())
        .await
        .expect("batch should run");

    let order: Vec<&str> = outcomes.iter().map(|o| o.target.as_str()).collect();
    assert_eq!(order, vec!["c", "a", "b"]);
    assert!(outcomes.iter().all(|o| o.success));
}

#[tokio::test]
async fn sequential_mode_calls_targets_one_at_a_time_in_order() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let registry = scripted(vec![
        ScriptedTarget::new("a", Duration::from_millis(40), Arc::clone(&calls)),
        ScriptedTarget::new("b", Duration::ZERO, Arc::clone(&calls)),
        ScriptedTarget::new("c", Duration::from_millis(20), Arc::clone(&calls)),
    ]);
    let orchestrator = orchestrator(registry, Duration::from_secs(5), DispatchMode::Sequential);

    let listing = orchestrator.list_all(Some(&ids(&["b", "a", "c"]))).await;

    let order: Vec<&str> = listing.iter().map(|l| l.target.as_str()).collect();
    assert_eq!(order, vec!["b", "a", "c"]);
    assert_eq!(listing[1].servers, vec!["a-server"]);
    assert_eq!(
        *calls.lock().expect("calls lock"),
        vec!["list:b", "list:a", "list:c"]
    );
}

#[tokio::test]
async fn unknown_target_fails_in_place() {
    let tmp = TempDir::new().expect("tempdir should succeed");
    let orchestrator = orchestrator(default_registry(&tmp), Duration::from_secs(5), DispatchMode::Concurrent);

    let outcomes = orchestrator
        .configure_all(
            &spec(),
            Some(&ids(&["cursor", "claude-code", "cursor"])),
            ConfigureOptions::default(),
        )
        .await
        .expect("batch should run");

    assert_eq!(outcomes.len(), 2, "duplicate ids are attempted once");
    assert_eq!(outcomes[0].target, "cursor");
    assert_eq!(outcomes[0].error_kind, Some(ErrorKind::UnknownTarget));
    assert!(outcomes[1].success);
    assert!(tmp.path().join("home/.claude.json").is_file());
}

#[tokio::test]
async fn external_process_targets_are_not_asked_to_roll_back() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut external = ScriptedTarget::new("cli-tool", Duration::ZERO, Arc::clone(&calls));
    external.write_mode = WriteMode::ExternalProcess;
    let external_rollbacks = Arc::clone(&external.rollbacks);
    let file = ScriptedTarget::new("file-tool", Duration::ZERO, Arc::clone(&calls));
    let file_rollbacks = Arc::clone(&file.rollbacks);
    let mut broken = ScriptedTarget::new("broken", Duration::ZERO, Arc::clone(&calls));
    broken.fail_configure = true;

    let orchestrator = orchestrator(
        scripted(vec![external, file, broken]),
        Duration::from_secs(5),
        DispatchMode::Concurrent,
    );
    let outcomes = orchestrator
        .configure_all(
            &spec(),
            None,
            ConfigureOptions {
                rollback_on_failure: true,
                backup: true,
            },
        )
        .await
        .expect("batch should run");

    assert_eq!(outcomes.len(), 3);
    assert!(!outcomes[0].rolled_back);
    assert!(outcomes[1].rolled_back);
    assert_eq!(outcomes[2].error_kind, Some(ErrorKind::Precondition));
    assert_eq!(*external_rollbacks.lock().expect("lock"), 0);
    assert_eq!(*file_rollbacks.lock().expect("lock"), 1);
}

#[tokio::test]
async fn default_selection_is_the_detected_subset() {
    let tmp = TempDir::new().expect("tempdir should succeed");
    fs::create_dir_all(tmp.path().join("home/.codex")).expect("codex footprint");
    write_file(&tmp.path().join("home/.claude.json"), "{}");

    let orchestrator = orchestrator(default_registry(&tmp), Duration::from_secs(5), DispatchMode::Concurrent);
    let detected = orchestrator.detect_all(None).await;
    let found: Vec<&str> = detected
        .iter()
        .filter(|o| o.found == Some(true))
        .map(|o| o.target.as_str())
        .collect();
    assert_eq!(found, vec!["claude-code", "codex"]);
    assert!(detected.iter().all(|o| o.path.is_some()));

    let outcomes = orchestrator
        .configure_all(&spec(), None, ConfigureOptions::default())
        .await
        .expect("batch should run");
    let configured: Vec<&str> = outcomes.iter().map(|o| o.target.as_str()).collect();
    assert_eq!(configured, vec!["claude-code", "codex"]);
    assert!(tmp.path().join("home/.codex/config.toml").is_file());
    assert!(!tmp.path().join("home/.gemini/settings.json").exists());
}

#[tokio::test]
async fn find_reports_targets_holding_the_server() {
    let tmp = TempDir::new().expect("tempdir should succeed");
    let orchestrator = orchestrator(default_registry(&tmp), Duration::from_secs(5), DispatchMode::Concurrent);
    let remote = ServerSpec::remote("api", Transport::Http, "https://api.example.com/mcp")
        .with_bearer("tok");

    orchestrator
        .configure_all(
            &remote,
            Some(&ids(&["claude-code", "vscode"])),
            ConfigureOptions::default(),
        )
        .await
        .expect("batch should run");

    let locations = orchestrator.find_server_across_targets("api", None).await;
    let found: Vec<&str> = locations.iter().map(|l| l.target.as_str()).collect();
    assert_eq!(found, vec!["claude-code", "vscode"]);
    assert_eq!(locations[0].spec.as_ref(), Some(&remote));

    let validation = orchestrator.validate_all(None).await;
    assert!(validation.iter().all(|o| o.success));
}
