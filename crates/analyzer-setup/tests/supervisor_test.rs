//! Service supervisor behaviour against fake processes

mod common;

use analyzer_setup::dependency::{
    ProcessConfig, ProcessHealth, ProcessLauncher, ReadinessPolicy, ServiceProcess, ServiceRole,
    ServiceSupervisor, SetupError, SystemLauncher,
};
use async_trait::async_trait;
use common::*;
use std::sync::Arc;
use std::time::Duration;

fn supervisor(launcher: Arc<FakeLauncher>) -> ServiceSupervisor {
    ServiceSupervisor::new(
        test_config(ReadinessPolicy::Probe),
        launcher,
        Arc::new(FakeProbe::ready()),
    )
}

#[tokio::test(start_paused = true)]
async fn test_start_returns_handles_for_both_services() {
    let log = event_log();
    let mut supervisor = supervisor(Arc::new(FakeLauncher::new(log.clone())));

    let handles = supervisor.start().await.unwrap();

    assert_eq!(handles.database.role, ServiceRole::Database);
    assert_eq!(handles.database.address.to_string(), "localhost:8000");
    assert_eq!(handles.app_server.role, ServiceRole::AppServer);
    assert_eq!(handles.app_server.address.port, 3001);
    assert_ne!(handles.database.pid, handles.app_server.pid);
    assert_eq!(supervisor.managed_process_count(), 2);
    assert_eq!(launches(&log), ["chroma", "app-server"]);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_start_is_rejected() {
    let log = event_log();
    let mut supervisor = supervisor(Arc::new(FakeLauncher::new(log.clone())));

    let first = supervisor.start_role(ServiceRole::Database).await.unwrap();
    let err = supervisor
        .start_role(ServiceRole::Database)
        .await
        .unwrap_err();

    match err {
        SetupError::AlreadyRunning { role, pid } => {
            assert_eq!(role, ServiceRole::Database);
            assert_eq!(pid, first.pid);
        }
        other => panic!("expected AlreadyRunning, got {other:?}"),
    }
    assert_eq!(launches(&log), ["chroma"]);
}

#[tokio::test(start_paused = true)]
async fn test_stop_terminates_in_reverse_order_once() {
    let log = event_log();
    let mut supervisor = supervisor(Arc::new(FakeLauncher::new(log.clone())));
    let handles = supervisor.start().await.unwrap();

    let stopped = supervisor.stop(&handles);
    assert_eq!(stopped, [ServiceRole::AppServer, ServiceRole::Database]);

    // a second stop finds nothing left to signal
    assert!(supervisor.stop(&handles).is_empty());
    assert_eq!(terminations(&log), ["app-server", "chroma"]);
    assert_eq!(supervisor.managed_process_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_ignores_stale_handle() {
    let log = event_log();
    let mut supervisor = supervisor(Arc::new(FakeLauncher::new(log.clone())));
    let mut handles = supervisor.start().await.unwrap();
    handles.database.pid = Some(1);

    let stopped = supervisor.stop(&handles);

    assert_eq!(stopped, [ServiceRole::AppServer]);
    assert!(supervisor.is_running(ServiceRole::Database));
    assert_eq!(terminations(&log), ["app-server"]);
}

#[tokio::test(start_paused = true)]
async fn test_health_reports_exited_process() {
    let log = event_log();
    let launcher = Arc::new(FakeLauncher::new(log.clone()));
    let mut supervisor = supervisor(launcher.clone());
    supervisor.start().await.unwrap();

    launcher.mark_exited("chroma");
    let health = supervisor.health();

    assert_eq!(
        health[&ServiceRole::Database],
        ProcessHealth::Exited(Some(1))
    );
    assert_eq!(health[&ServiceRole::AppServer], ProcessHealth::Running);
    // exited processes stay owned until stopped
    assert_eq!(supervisor.managed_process_count(), 2);
    assert!(supervisor.uptime(ServiceRole::Database).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_stop_releases_exited_process() {
    let log = event_log();
    let launcher = Arc::new(FakeLauncher::new(log.clone()));
    let mut supervisor = supervisor(launcher.clone());
    let handles = supervisor.start().await.unwrap();

    launcher.mark_exited("chroma");
    supervisor.health();

    let stopped = supervisor.stop(&handles);

    assert_eq!(stopped, [ServiceRole::AppServer, ServiceRole::Database]);
    assert_eq!(supervisor.managed_process_count(), 0);
    assert!(supervisor.uptime(ServiceRole::Database).is_none());
}

/// Stands in short real commands for the configured services
#[cfg(unix)]
struct SleepLauncher;

#[cfg(unix)]
#[async_trait]
impl ProcessLauncher for SleepLauncher {
    async fn launch(&self, config: &ProcessConfig) -> anyhow::Result<Box<dyn ServiceProcess>> {
        let seconds = match config.name.as_str() {
            "chroma" => "0.5",
            _ => "30",
        };
        let sleeper = ProcessConfig::new(config.name.clone(), "sleep".to_string())
            .with_args(vec![seconds.to_string()]);
        SystemLauncher.launch(&sleeper).await
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_stop_after_real_database_exit() {
    let mut supervisor = ServiceSupervisor::new(
        test_config(ReadinessPolicy::Probe),
        Arc::new(SleepLauncher),
        Arc::new(FakeProbe::ready()),
    );
    let handles = supervisor.start().await.unwrap();
    assert!(handles.database.pid.is_some());

    tokio::time::sleep(Duration::from_secs(1)).await;
    let health = supervisor.health();
    assert_eq!(
        health[&ServiceRole::Database],
        ProcessHealth::Exited(Some(0))
    );

    let stopped = supervisor.stop(&handles);

    assert_eq!(stopped, [ServiceRole::AppServer, ServiceRole::Database]);
    assert_eq!(supervisor.managed_process_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_all_after_partial_start() {
    let log = event_log();
    let mut supervisor = supervisor(Arc::new(FakeLauncher::new(log.clone())));
    supervisor.start_role(ServiceRole::Database).await.unwrap();

    assert_eq!(supervisor.stop_all(), [ServiceRole::Database]);
    assert_eq!(terminations(&log), ["chroma"]);
}
