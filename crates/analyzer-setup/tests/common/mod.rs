//! Recording fakes for the command, launcher and readiness seams

#![allow(dead_code)]

use analyzer_setup::dependency::command::CommandError;
use analyzer_setup::dependency::{
    CommandOutput, CommandRunner, CommandSpec, ProcessConfig, ProcessHealth, ProcessLauncher,
    ReadinessPolicy, ReadinessProbe, ServiceAddress, ServiceProcess, SetupConfig,
};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Everything the fakes observed, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Command(String),
    Launch(String),
    Terminate(String),
}

pub type EventLog = Arc<Mutex<Vec<Event>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn events(log: &EventLog) -> Vec<Event> {
    log.lock().unwrap().clone()
}

pub fn launches(log: &EventLog) -> Vec<String> {
    events(log)
        .into_iter()
        .filter_map(|event| match event {
            Event::Launch(name) => Some(name),
            _ => None,
        })
        .collect()
}

pub fn terminations(log: &EventLog) -> Vec<String> {
    events(log)
        .into_iter()
        .filter_map(|event| match event {
            Event::Terminate(name) => Some(name),
            _ => None,
        })
        .collect()
}

pub fn commands(log: &EventLog) -> Vec<String> {
    events(log)
        .into_iter()
        .filter_map(|event| match event {
            Event::Command(line) => Some(line),
            _ => None,
        })
        .collect()
}

/// Config with short timings that never touches the real filesystem layout
pub fn test_config(readiness: ReadinessPolicy) -> SetupConfig {
    SetupConfig {
        readiness,
        readiness_timeout: Duration::from_secs(5),
        readiness_interval: Duration::from_millis(500),
        ..Default::default()
    }
}

/// Every program succeeds unless listed as missing, failing or slow
#[derive(Default)]
pub struct FakeRunner {
    pub log: EventLog,
    pub missing: Vec<&'static str>,
    pub failing: Vec<&'static str>,
    pub slow: Option<(&'static str, Duration)>,
}

impl FakeRunner {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            ..Default::default()
        }
    }

    pub fn with_missing(mut self, programs: &[&'static str]) -> Self {
        self.missing.extend_from_slice(programs);
        self
    }

    pub fn with_failing(mut self, programs: &[&'static str]) -> Self {
        self.failing.extend_from_slice(programs);
        self
    }

    pub fn with_slow(mut self, program: &'static str, delay: Duration) -> Self {
        self.slow = Some((program, delay));
        self
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        self.log
            .lock()
            .unwrap()
            .push(Event::Command(spec.command_line()));

        if self.missing.contains(&spec.program.as_str()) {
            return Err(CommandError::NotFound {
                program: spec.program.clone(),
            });
        }

        if let Some((program, delay)) = self.slow {
            if program == spec.program {
                tokio::time::sleep(delay).await;
            }
        }

        if self.failing.contains(&spec.program.as_str()) {
            return Ok(CommandOutput {
                exit_code: Some(1),
                stdout: String::new(),
                stderr: format!("{} failed to install\n", spec.program),
            });
        }

        Ok(CommandOutput {
            exit_code: Some(0),
            stdout: "v1.0.0\n".to_string(),
            stderr: String::new(),
        })
    }
}

/// Hands out fake processes and remembers when each was launched
pub struct FakeLauncher {
    pub log: EventLog,
    next_pid: AtomicU32,
    failing: Option<&'static str>,
    launched_at: Mutex<Vec<(String, Instant)>>,
    exited: Mutex<HashMap<String, Arc<AtomicBool>>>,
}

impl FakeLauncher {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            next_pid: AtomicU32::new(1000),
            failing: None,
            launched_at: Mutex::new(Vec::new()),
            exited: Mutex::new(HashMap::new()),
        }
    }

    pub fn failing(mut self, name: &'static str) -> Self {
        self.failing = Some(name);
        self
    }

    pub fn launch_time(&self, name: &str) -> Option<Instant> {
        self.launched_at
            .lock()
            .unwrap()
            .iter()
            .find(|(launched, _)| launched == name)
            .map(|(_, at)| *at)
    }

    /// Simulate the named process dying on its own
    pub fn mark_exited(&self, name: &str) {
        if let Some(flag) = self.exited.lock().unwrap().get(name) {
            flag.store(true, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl ProcessLauncher for FakeLauncher {
    async fn launch(&self, config: &ProcessConfig) -> Result<Box<dyn ServiceProcess>> {
        if self.failing == Some(config.name.as_str()) {
            anyhow::bail!("Failed to spawn process: {}", config.command);
        }

        self.log
            .lock()
            .unwrap()
            .push(Event::Launch(config.name.clone()));
        self.launched_at
            .lock()
            .unwrap()
            .push((config.name.clone(), Instant::now()));

        let exited = Arc::new(AtomicBool::new(false));
        self.exited
            .lock()
            .unwrap()
            .insert(config.name.clone(), exited.clone());

        Ok(Box::new(FakeProcess {
            name: config.name.clone(),
            pid: self.next_pid.fetch_add(1, Ordering::SeqCst),
            log: self.log.clone(),
            exited,
        }))
    }
}

pub struct FakeProcess {
    name: String,
    pid: u32,
    log: EventLog,
    exited: Arc<AtomicBool>,
}

impl ServiceProcess for FakeProcess {
    fn name(&self) -> &str {
        &self.name
    }

    /// Like a reaped OS child, an exited process no longer reports a pid
    fn pid(&self) -> Option<u32> {
        if self.exited.load(Ordering::SeqCst) {
            None
        } else {
            Some(self.pid)
        }
    }

    fn terminate(&mut self) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(Event::Terminate(self.name.clone()));
        Ok(())
    }

    fn health(&mut self) -> ProcessHealth {
        if self.exited.load(Ordering::SeqCst) {
            ProcessHealth::Exited(Some(1))
        } else {
            ProcessHealth::Running
        }
    }
}

/// Readiness probe that is either always or never ready
pub struct FakeProbe {
    ready: bool,
    pub probes: AtomicUsize,
}

impl FakeProbe {
    pub fn ready() -> Self {
        Self {
            ready: true,
            probes: AtomicUsize::new(0),
        }
    }

    pub fn never_ready() -> Self {
        Self {
            ready: false,
            probes: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ReadinessProbe for FakeProbe {
    async fn is_ready(&self, _address: &ServiceAddress) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.ready
    }
}
