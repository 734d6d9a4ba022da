//! Orchestrator integration tests
//!
//! Runs whole topologies against the in-memory fleet in `common`.

mod common;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

use kf_core::{CommitOutcome, HostDecision, HostDefaults, KeyList, Topology};
use kf_orchestrator::{Action, HostStatus, Orchestrator, RunEvent, RunOptions, RunSummary};

use common::{FakeConnector, FakePrompter};

const AUTH: &str = ".ssh/authorized_keys";
const KEY_A: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIA alice";
const KEY_B: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIB bob";
const KEY_C: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIC carol";

fn topology(text: &str) -> Topology {
    Topology::parse(text, &HostDefaults::default()).unwrap()
}

/// Run and return the summary plus every emitted event
async fn run(
    connector: &FakeConnector,
    prompter: Arc<FakePrompter>,
    options: RunOptions,
    text: &str,
) -> (RunSummary, Vec<RunEvent>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let orchestrator = Orchestrator::new(connector.clone(), prompter, tx, options);
    let summary = orchestrator.run(&topology(text)).await;

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    (summary, events)
}

fn position(log: &[String], entry: &str) -> usize {
    log.iter()
        .position(|l| l == entry)
        .unwrap_or_else(|| panic!("{:?} not in log {:#?}", entry, log))
}

fn write_keyfile(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

fn status_of(summary: &RunSummary, host: &str) -> HostStatus {
    summary
        .hosts
        .iter()
        .find(|r| r.host.host() == host)
        .map(|r| r.status.clone())
        .unwrap_or_else(|| panic!("{} was not visited", host))
}

#[tokio::test]
async fn test_add_through_gateway_and_direct() {
    let dir = tempfile::tempdir().unwrap();
    let keyfile = write_keyfile(&dir, "alice.pub", &format!("{}\n", KEY_A));

    let connector = FakeConnector::new();
    let mut options = RunOptions::new(Action::Add);
    options.keys = KeyList::single(keyfile);

    let (summary, events) = run(
        &connector,
        Arc::new(FakePrompter::new()),
        options,
        "gateway g1\n host-a\nend\nhost-b\n",
    )
    .await;

    assert_eq!(summary.succeeded(), 2);
    assert_eq!(summary.exit_code(), 0);
    for host in ["host-a", "host-b"] {
        assert_eq!(connector.file(host, AUTH).unwrap(), format!("{}\n", KEY_A));
    }

    let log = connector.log();
    let open = position(&log, "open g1 via direct");
    let host_a = position(&log, "connect host-a via g1");
    let done_a = position(&log, "disconnect host-a");
    let close = position(&log, "close g1");
    let host_b = position(&log, "connect host-b via direct");
    assert!(open < host_a && host_a < done_a && done_a < close && close < host_b);

    let started: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::HostStarted { host } => Some(host.to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(started, vec!["host-a", "host-b"]);
    assert!(events.iter().any(|e| matches!(
        e,
        RunEvent::Committed { outcome: CommitOutcome::Activated { .. }, .. }
    )));
}

#[tokio::test]
async fn test_nested_gateways_tunnel_through_their_parent() {
    let connector = FakeConnector::new();

    let (summary, _) = run(
        &connector,
        Arc::new(FakePrompter::new()),
        RunOptions::new(Action::Hostname),
        "gateway g1\n gateway g2\n  h1\n end\n h2\nend\n",
    )
    .await;

    assert_eq!(summary.succeeded(), 2);
    let log = connector.log();
    let open_g1 = position(&log, "open g1 via direct");
    let open_g2 = position(&log, "open g2 via g1");
    let h1 = position(&log, "connect h1 via g2");
    let close_g2 = position(&log, "close g2");
    let h2 = position(&log, "connect h2 via g1");
    let close_g1 = position(&log, "close g1");
    assert!(open_g1 < open_g2 && open_g2 < h1 && h1 < close_g2);
    assert!(close_g2 < h2 && h2 < close_g1);
}

#[tokio::test]
async fn test_add_keeps_non_utf8_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let keyfile = write_keyfile(&dir, "alice.pub", KEY_A);
    let connector = FakeConnector::new();
    let mut existing = b"# owner: Ren\xe9\n".to_vec();
    existing.extend_from_slice(format!("{}\n", KEY_B).as_bytes());
    connector.put_bytes("h1", AUTH, &existing);

    let mut options = RunOptions::new(Action::Add);
    options.keys = KeyList::single(keyfile);
    let (summary, _) = run(&connector, Arc::new(FakePrompter::new()), options, "h1\n").await;

    assert_eq!(status_of(&summary, "h1"), HostStatus::Succeeded);
    let mut expected = existing.clone();
    expected.extend_from_slice(format!("{}\n", KEY_A).as_bytes());
    assert_eq!(connector.file_bytes("h1", AUTH).unwrap(), expected);
}

#[tokio::test]
async fn test_second_add_is_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let keyfile = write_keyfile(&dir, "alice.pub", KEY_A);
    let connector = FakeConnector::new();
    connector.put_file("h1", AUTH, &format!("{}\n", KEY_A));

    let mut options = RunOptions::new(Action::Add);
    options.keys = KeyList::single(keyfile);
    let (summary, events) = run(&connector, Arc::new(FakePrompter::new()), options, "h1\n").await;

    assert_eq!(status_of(&summary, "h1"), HostStatus::Succeeded);
    assert!(events.iter().any(|e| matches!(
        e,
        RunEvent::Committed { outcome: CommitOutcome::Unchanged, .. }
    )));
    assert!(!connector.log().iter().any(|l| l.starts_with("write")));
}

#[tokio::test]
async fn test_failed_gateway_skips_only_its_subtree() {
    let connector = FakeConnector::new().with(|fleet| {
        fleet.dead_gateways.insert("bad".to_string());
    });

    let (summary, events) = run(
        &connector,
        Arc::new(FakePrompter::new()),
        RunOptions::new(Action::Hostname),
        "gateway g1\n gateway bad\n  h1\n end\n h2\nend\nh3\n",
    )
    .await;

    assert_eq!(summary.hosts.len(), 2);
    assert_eq!(status_of(&summary, "h2"), HostStatus::Succeeded);
    assert_eq!(status_of(&summary, "h3"), HostStatus::Succeeded);
    assert_eq!(summary.gateway_failures.len(), 1);
    assert_eq!(summary.gateway_failures[0].gateway.host(), "bad");
    assert_eq!(summary.exit_code(), 1);

    let log = connector.log();
    assert!(!log.iter().any(|l| l.starts_with("connect h1")));
    position(&log, "connect h2 via g1");
    position(&log, "close g1");
    assert!(events
        .iter()
        .any(|e| matches!(e, RunEvent::GatewayFailed { gateway, .. } if gateway.host() == "bad")));
}

#[tokio::test]
async fn test_quit_closes_every_open_gateway() {
    let connector = FakeConnector::new();
    let prompter = Arc::new(
        FakePrompter::new().decisions(&[HostDecision::Continue, HostDecision::Quit]),
    );
    let mut options = RunOptions::new(Action::Hostname);
    options.interactive = true;

    let (summary, events) = run(
        &connector,
        prompter,
        options,
        "gateway g1\n gateway g2\n  h1\n  h2\n end\nend\nh3\n",
    )
    .await;

    assert!(summary.quit);
    assert_eq!(summary.exit_code(), 0);
    assert_eq!(summary.hosts.len(), 1);

    let log = connector.log();
    let g1 = position(&log, "open g1 via direct");
    let g2 = position(&log, "open g2 via g1");
    let h1 = position(&log, "connect h1 via g2");
    assert!(g1 < g2 && g2 < h1);
    assert!(!log.iter().any(|l| l.starts_with("connect h2") || l.starts_with("connect h3")));
    let n = log.len();
    assert_eq!(&log[n - 2..], &["close g2".to_string(), "close g1".to_string()]);
    assert!(events.iter().any(|e| matches!(e, RunEvent::Quit)));
}

#[tokio::test]
async fn test_skip_leaves_host_alone() {
    let connector = FakeConnector::new();
    let prompter = Arc::new(FakePrompter::new().decisions(&[HostDecision::Skip]));
    let mut options = RunOptions::new(Action::Hostname);
    options.interactive = true;

    let (summary, _) = run(&connector, prompter, options, "h1\nh2\n").await;

    assert_eq!(status_of(&summary, "h1"), HostStatus::Skipped);
    assert_eq!(status_of(&summary, "h2"), HostStatus::Succeeded);
    assert_eq!(summary.exit_code(), 0);
    assert!(!connector.log().iter().any(|l| l.starts_with("connect h1")));
}

#[tokio::test]
async fn test_password_retry_until_accepted() {
    let connector = FakeConnector::new().with(|fleet| {
        fleet.passwords.insert("h1".to_string(), "secret".to_string());
    });
    let prompter = Arc::new(FakePrompter::new().passwords(&["wrong", "secret"]));

    let (summary, _) = run(
        &connector,
        Arc::clone(&prompter),
        RunOptions::new(Action::Hostname),
        "h1\n",
    )
    .await;

    assert_eq!(status_of(&summary, "h1"), HostStatus::Succeeded);
    assert_eq!(prompter.password_prompts(), 2);
    let attempts: Vec<String> = connector
        .log()
        .into_iter()
        .filter(|l| l.starts_with("connect h1"))
        .collect();
    assert_eq!(
        attempts,
        vec![
            "connect h1 via direct",
            "connect h1 via direct password wrong",
            "connect h1 via direct password secret",
        ]
    );
}

#[tokio::test]
async fn test_empty_password_gives_up() {
    let connector = FakeConnector::new().with(|fleet| {
        fleet.passwords.insert("h1".to_string(), "secret".to_string());
    });
    let prompter = Arc::new(FakePrompter::new().passwords(&[""]));

    let (summary, _) = run(
        &connector,
        Arc::clone(&prompter),
        RunOptions::new(Action::Hostname),
        "h1\nh2\n",
    )
    .await;

    assert!(status_of(&summary, "h1").is_failure());
    assert_eq!(status_of(&summary, "h2"), HostStatus::Succeeded);
    assert_eq!(prompter.password_prompts(), 1);
    assert_eq!(summary.exit_code(), 1);
}

#[tokio::test]
async fn test_unreachable_host_does_not_prompt() {
    let connector = FakeConnector::new().with(|fleet| {
        fleet.dead_hosts.insert("h1".to_string());
    });
    let prompter = Arc::new(FakePrompter::new());

    let (summary, _) = run(
        &connector,
        Arc::clone(&prompter),
        RunOptions::new(Action::Hostname),
        "h1\n",
    )
    .await;

    assert!(status_of(&summary, "h1").is_failure());
    assert_eq!(prompter.password_prompts(), 0);
}

#[tokio::test]
async fn test_host_key_mismatch_never_asks_for_password() {
    let connector = FakeConnector::new().with(|fleet| {
        fleet.changed_host_keys.insert("h1".to_string());
        fleet.passwords.insert("h1".to_string(), "secret".to_string());
    });
    let prompter = Arc::new(FakePrompter::new().passwords(&["secret"]));

    let (summary, _) = run(
        &connector,
        Arc::clone(&prompter),
        RunOptions::new(Action::Hostname),
        "h1\nh2\n",
    )
    .await;

    assert!(status_of(&summary, "h1").is_failure());
    assert_eq!(status_of(&summary, "h2"), HostStatus::Succeeded);
    assert_eq!(prompter.password_prompts(), 0);
    assert!(!connector.log().iter().any(|l| l.contains("password")));
}

#[tokio::test]
async fn test_malformed_keyfile_keeps_earlier_keys() {
    let dir = tempfile::tempdir().unwrap();
    let keyfile = write_keyfile(
        &dir,
        "mixed.pub",
        &format!("{}\nssh-rsa !!broken!! x\n{}\n", KEY_A, KEY_B),
    );
    let connector = FakeConnector::new();
    let mut options = RunOptions::new(Action::Add);
    options.keys = KeyList::single(keyfile);

    let (summary, events) = run(&connector, Arc::new(FakePrompter::new()), options, "h1\n").await;

    assert!(status_of(&summary, "h1").is_failure());
    assert_eq!(connector.file("h1", AUTH).unwrap(), format!("{}\n", KEY_A));
    assert!(events.iter().any(|e| matches!(
        e,
        RunEvent::KeysReconciled { error: Some(_), changes, .. } if changes.len() == 1
    )));
}

#[tokio::test]
async fn test_addremove_honours_markers() {
    let dir = tempfile::tempdir().unwrap();
    write_keyfile(&dir, "alice.pub", KEY_A);
    write_keyfile(&dir, "carol.pub", KEY_C);
    let list = write_keyfile(&dir, "team.list", "+carol.pub\n-alice.pub\n");

    let connector = FakeConnector::new();
    connector.put_file("h1", AUTH, &format!("{}\n{}\n", KEY_A, KEY_B));

    let mut options = RunOptions::new(Action::AddRemove);
    options.keys = KeyList::load(&list).unwrap();
    let (summary, _) = run(&connector, Arc::new(FakePrompter::new()), options, "h1\n").await;

    assert_eq!(status_of(&summary, "h1"), HostStatus::Succeeded);
    assert_eq!(connector.file("h1", AUTH).unwrap(), format!("{}\n{}\n", KEY_B, KEY_C));
}

#[tokio::test]
async fn test_add_ignores_remove_marker() {
    let dir = tempfile::tempdir().unwrap();
    write_keyfile(&dir, "alice.pub", KEY_A);
    let list = write_keyfile(&dir, "team.list", "-alice.pub\n");

    let connector = FakeConnector::new();
    let mut options = RunOptions::new(Action::Add);
    options.keys = KeyList::load(&list).unwrap();
    run(&connector, Arc::new(FakePrompter::new()), options, "h1\n").await;

    assert_eq!(connector.file("h1", AUTH).unwrap(), format!("{}\n", KEY_A));
}

#[tokio::test]
async fn test_list_reports_keys_without_writing() {
    let connector = FakeConnector::new();
    connector.put_file("h1", AUTH, &format!("# managed\n{}\n", KEY_A));

    let (summary, events) = run(
        &connector,
        Arc::new(FakePrompter::new()),
        RunOptions::new(Action::List),
        "h1\n",
    )
    .await;

    assert_eq!(status_of(&summary, "h1"), HostStatus::Succeeded);
    let keys = events
        .iter()
        .find_map(|e| match e {
            RunEvent::KeysListed { keys, .. } => Some(keys.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].algorithm, "ssh-ed25519");
    assert_eq!(keys[0].comment, "alice");
    assert!(!connector.log().iter().any(|l| l.starts_with("write")));
}

#[tokio::test]
async fn test_failing_command_still_closes_session() {
    let connector = FakeConnector::new();
    let (summary, events) = run(
        &connector,
        Arc::new(FakePrompter::new()),
        RunOptions::new(Action::Cmd("false".to_string())),
        "h1\n",
    )
    .await;

    assert!(status_of(&summary, "h1").is_failure());
    position(&connector.log(), "disconnect h1");
    assert!(events.iter().any(|e| matches!(
        e,
        RunEvent::CommandFinished { output, .. } if output.exit_status == 1
    )));
}

#[tokio::test]
async fn test_script_is_uploaded_run_and_removed() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_keyfile(&dir, "fix.sh", "echo fixed\n");
    let connector = FakeConnector::new();

    let (summary, events) = run(
        &connector,
        Arc::new(FakePrompter::new()),
        RunOptions::new(Action::Script(script)),
        "h1\n",
    )
    .await;

    assert_eq!(status_of(&summary, "h1"), HostStatus::Succeeded);
    let log = connector.log();
    let write = position(&log, "write h1 .keyfleet-script");
    let exec = position(&log, "exec h1 sh .keyfleet-script");
    let rm = position(&log, "exec h1 rm -f .keyfleet-script");
    assert!(write < exec && exec < rm);
    assert!(connector.file("h1", ".keyfleet-script").is_none());
    assert!(events.iter().any(|e| matches!(
        e,
        RunEvent::CommandFinished { output, .. } if output.stdout_string() == "echo fixed\n"
    )));
}

#[tokio::test]
async fn test_scp_uploads_to_home() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_keyfile(&dir, "motd", "welcome\n");
    let connector = FakeConnector::new();

    let (summary, events) = run(
        &connector,
        Arc::new(FakePrompter::new()),
        RunOptions::new(Action::Scp(file)),
        "h1\n",
    )
    .await;

    assert_eq!(status_of(&summary, "h1"), HostStatus::Succeeded);
    assert_eq!(connector.file("h1", "motd").unwrap(), "welcome\n");
    assert!(events
        .iter()
        .any(|e| matches!(e, RunEvent::Uploaded { bytes: 8, .. })));
}

#[tokio::test]
async fn test_ssh_uses_passthrough_through_gateway() {
    let connector = FakeConnector::new();
    let (summary, _) = run(
        &connector,
        Arc::new(FakePrompter::new()),
        RunOptions::new(Action::Ssh),
        "gateway g1\n h1\nend\n",
    )
    .await;

    assert_eq!(status_of(&summary, "h1"), HostStatus::Succeeded);
    let log = connector.log();
    position(&log, "ssh h1 via g1");
    assert!(!log.iter().any(|l| l.starts_with("connect h1")));
}
