//! Session lifecycle tests against real child processes.
//!
//! The debugger is played by a small `sh` script speaking the same
//! prompt protocol, so these run anywhere a POSIX shell is available.
#![cfg(unix)]

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use common::{fast_settings, launch, registry, wait_gone, FAKE_DEBUGGER, STUBBORN_DEBUGGER};
use remote_debugger::tools::{Action, DelveDefaults, DelveInput, DelveStatus, DelveTool};
use remote_debugger::transport::{signal_group, Signal};
use remote_debugger::{
    DebuggerError, IdleReaper, ProcessTransport, ReaperSettings, SessionId, SessionRegistry,
    SessionSettings, Target,
};

fn id(s: &str) -> SessionId {
    SessionId::new(s).unwrap()
}

fn target() -> Target {
    Target::new("localhost", 2345)
}

#[tokio::test]
async fn test_connect_help_bogus_disconnect() {
    let registry = registry(FAKE_DEBUGGER);
    let session = registry.create(id("d1"), target()).await.unwrap();
    let pid = session.pid().unwrap();
    let timeout = Duration::from_secs(5);

    let help = registry.get("d1").unwrap().run_command("help", timeout).await.unwrap();
    assert!(!help.timed_out());
    assert!(help.output.contains("The following commands are available:"));

    // Unknown commands answer on stderr; the error belongs to that
    // command and the session stays usable
    let bogus = registry.get("d1").unwrap().run_command("boguscmd", timeout).await.unwrap();
    assert!(!bogus.closed());
    assert!(!bogus.timed_out());
    assert_eq!(bogus.stderr, vec!["Command failed: command not available"]);
    let again = registry.get("d1").unwrap().run_command("help", timeout).await.unwrap();
    assert!(again.output.contains("Sets a breakpoint."));
    assert!(again.stderr.is_empty());

    registry.remove_and_terminate("d1").await.unwrap();
    assert!(!registry.contains("d1"));
    assert!(matches!(
        registry.get("d1"),
        Err(DebuggerError::SessionNotFound(_))
    ));
    assert!(wait_gone(pid, Duration::from_secs(3)).await);
}

#[tokio::test]
async fn test_stderr_never_spills_into_next_command() {
    let registry = registry(FAKE_DEBUGGER);
    let timeout = Duration::from_secs(5);
    for round in 0..10 {
        let name = format!("s{round}");
        let session = registry.create(id(&name), target()).await.unwrap();

        let bogus = session.run_command("boguscmd", timeout).await.unwrap();
        let next = session.run_command("help", timeout).await.unwrap();
        assert_eq!(bogus.stderr.len(), 1, "round {round}: {:?}", bogus.stderr);
        assert!(next.stderr.is_empty(), "round {round}: {:?}", next.stderr);

        drop(session);
        registry.remove_and_terminate(&name).await.unwrap();
    }
}

#[tokio::test]
async fn test_debugger_exiting_on_its_own_leaves_registry() {
    let registry = registry(FAKE_DEBUGGER);
    let session = registry.create(id("d1"), target()).await.unwrap();
    let pid = session.pid().unwrap();

    let exchange = session.run_command("exit", Duration::from_secs(5)).await.unwrap();
    assert!(exchange.closed());
    assert!(session.is_defunct());
    drop(session);

    // Never observable as live once its process is gone
    assert!(!registry.contains("d1"));
    assert!(matches!(
        registry.get("d1"),
        Err(DebuggerError::SessionNotFound(_))
    ));
    assert!(wait_gone(pid, Duration::from_secs(3)).await);

    // The id is reusable right away
    let fresh = registry.create(id("d1"), target()).await.unwrap();
    let help = fresh.run_command("help", Duration::from_secs(5)).await.unwrap();
    assert!(help.output.contains("Sets a breakpoint."));
    assert_eq!(registry.count(), 1);
    registry.shutdown_all().await.unwrap();
}

#[tokio::test]
async fn test_reaper_collects_exited_debugger_early() {
    let registry = registry(FAKE_DEBUGGER);
    let session = registry.create(id("crash"), target()).await.unwrap();
    let pid = session.pid().unwrap();
    signal_group(pid, Signal::Kill).unwrap();
    assert!(wait_gone(pid, Duration::from_secs(3)).await);

    let reaper = IdleReaper::new(Arc::clone(&registry), ReaperSettings::default());
    // Wait for the reclamation task to publish the exit status
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while !session.is_defunct() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    drop(session);

    assert_eq!(reaper.sweep().await, 1);
    assert_eq!(registry.count(), 0);
    assert!(registry.create(id("crash"), target()).await.is_ok());
    registry.shutdown_all().await.unwrap();
}

#[tokio::test]
async fn test_duplicate_connect_keeps_first() {
    let registry = registry(FAKE_DEBUGGER);
    let first = registry.create(id("d1"), target()).await.unwrap();

    let err = registry.create(id("d1"), target()).await.unwrap_err();
    assert!(matches!(err, DebuggerError::SessionExists(ref s) if s == "d1"));
    assert_eq!(registry.count(), 1);

    let current = registry.get("d1").unwrap();
    assert!(Arc::ptr_eq(&first, &current));
    assert_eq!(current.pid(), first.pid());
    let exchange = current.run_command("help", Duration::from_secs(5)).await.unwrap();
    assert!(exchange.output.contains("continue (alias: c)"));

    registry.shutdown_all().await.unwrap();
}

#[tokio::test]
async fn test_unknown_session_has_no_side_effects() {
    let registry = registry(FAKE_DEBUGGER);
    assert!(matches!(
        registry.get("ghost"),
        Err(DebuggerError::SessionNotFound(_))
    ));
    assert!(matches!(
        registry.remove_and_terminate("ghost").await,
        Err(DebuggerError::SessionNotFound(_))
    ));
    assert_eq!(registry.count(), 0);
    assert!(registry.list().unwrap().is_empty());
}

#[tokio::test]
async fn test_connect_then_disconnect_leaves_nothing() {
    let registry = registry(FAKE_DEBUGGER);
    for name in ["a1", "b2", "c3"] {
        let pid = registry.create(id(name), target()).await.unwrap().pid().unwrap();
        registry.remove_and_terminate(name).await.unwrap();
        assert!(!registry.contains(name));
        assert!(wait_gone(pid, Duration::from_secs(3)).await, "{name} left pid {pid}");
    }
    assert_eq!(registry.count(), 0);
}

#[tokio::test]
async fn test_concurrent_commands_never_overlap() {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let (client_rd, client_wr) = tokio::io::split(client);
    let (server_rd, mut server_wr) = tokio::io::split(server);
    let overlapped = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&overlapped);

    tokio::spawn(async move {
        let mut reader = BufReader::new(server_rd);
        if server_wr.write_all(b"(dlv) ").await.is_err() {
            return;
        }
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            // Bytes arriving before this command is answered mean a second
            // command was written while the first was in flight
            if let Ok(Ok(pending)) =
                tokio::time::timeout(Duration::from_millis(30), reader.fill_buf()).await
            {
                if !pending.is_empty() {
                    flag.store(true, Ordering::SeqCst);
                }
            }
            let reply = format!("ok {}\n(dlv) ", line.trim_end());
            if server_wr.write_all(reply.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    let registry = SessionRegistry::new(
        launch(FAKE_DEBUGGER),
        SessionSettings {
            startup_delay: Duration::ZERO,
            ..fast_settings()
        },
    );
    let session = registry
        .create_from_transport(
            id("mem"),
            target(),
            ProcessTransport::from_streams(client_wr, client_rd),
        )
        .await
        .unwrap();

    let results = join_all((0..8).map(|i| {
        let session = Arc::clone(&session);
        async move {
            let exchange = session
                .run_command(&format!("print v{i}"), Duration::from_secs(5))
                .await
                .unwrap();
            (i, exchange.output)
        }
    }))
    .await;

    for (i, output) in results {
        assert_eq!(output, format!("ok print v{i}"));
    }
    assert!(!overlapped.load(Ordering::SeqCst));
    assert_eq!(session.command_count(), 8);

    registry.remove_and_terminate("mem").await.unwrap();
}

#[tokio::test]
async fn test_reaper_evicts_only_past_threshold() {
    let registry = registry(FAKE_DEBUGGER);
    let session = registry.create(id("idle"), target()).await.unwrap();
    let pid = session.pid().unwrap();
    let base = session.last_used();
    drop(session);

    let reaper = IdleReaper::new(Arc::clone(&registry), ReaperSettings::default());

    assert_eq!(reaper.sweep_at(base + Duration::from_secs(29 * 60)).await, 0);
    assert!(registry.contains("idle"));

    assert_eq!(reaper.sweep_at(base + Duration::from_secs(31 * 60)).await, 1);
    assert!(!registry.contains("idle"));
    assert!(wait_gone(pid, Duration::from_secs(3)).await);
}

#[tokio::test]
async fn test_sigterm_ignored_escalates_to_kill() {
    let registry = registry(STUBBORN_DEBUGGER);
    let session = registry.create(id("stubborn"), target()).await.unwrap();
    let pid = session.pid().unwrap();
    let exchange = session.run_command("help", Duration::from_secs(5)).await.unwrap();
    assert_eq!(exchange.output, "ignored: help");
    drop(session);

    let outcome = registry.remove_and_terminate("stubborn").await.unwrap();
    assert!(outcome.forced);
    assert!(!outcome.leaked);
    assert!(wait_gone(pid, Duration::from_secs(3)).await);
}

#[tokio::test]
async fn test_id_held_until_teardown_completes() {
    let registry = Arc::new(SessionRegistry::new(
        launch(FAKE_DEBUGGER),
        SessionSettings {
            exit_grace: Duration::from_millis(400),
            ..fast_settings()
        },
    ));
    registry.create(id("re"), target()).await.unwrap();

    let closing = Arc::clone(&registry);
    let teardown = tokio::spawn(async move { closing.remove_and_terminate("re").await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Hidden from lookups, but not yet reusable
    assert!(!registry.contains("re"));
    assert!(matches!(
        registry.get("re"),
        Err(DebuggerError::SessionNotFound(_))
    ));
    assert!(matches!(
        registry.create(id("re"), target()).await,
        Err(DebuggerError::SessionExists(_))
    ));

    teardown.await.unwrap().unwrap();
    let fresh = registry.create(id("re"), target()).await.unwrap();
    assert_eq!(fresh.command_count(), 0);
    registry.shutdown_all().await.unwrap();
}

#[tokio::test]
async fn test_abandoned_request_does_not_cancel_command() {
    let registry = Arc::new(SessionRegistry::new(
        launch(FAKE_DEBUGGER),
        SessionSettings {
            command_timeout: Duration::from_millis(300),
            ..fast_settings()
        },
    ));
    let tool = DelveTool::new(Arc::clone(&registry), DelveDefaults::default());
    let request = |action, command: &str| DelveInput {
        session_id: Some("c1".to_string()),
        action: Some(action),
        command: command.to_string(),
        ..DelveInput::default()
    };

    tool.invoke(request(Action::Connect, ""), None).await.unwrap();

    // The caller gives up long before the command's own deadline
    let abandoned = tokio::time::timeout(
        Duration::from_millis(20),
        tool.invoke(request(Action::Command, "hang"), None),
    )
    .await;
    assert!(abandoned.is_err());

    let out = tool.invoke(request(Action::Command, "help"), None).await.unwrap();
    assert_eq!(out.status, DelveStatus::CommandExecuted);
    assert!(out.output.contains("Sets a breakpoint."));
    assert_eq!(registry.get("c1").unwrap().command_count(), 2);

    tool.invoke(request(Action::Disconnect, ""), None).await.unwrap();
    assert_eq!(registry.count(), 0);
}
