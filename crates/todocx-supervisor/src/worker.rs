use std::{
    ffi::OsString,
    io,
    path::{Path, PathBuf},
    process::Stdio,
    sync::Arc,
};

use serde::Serialize;
use todocx_observability::DiagnosticLog;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::{Child, Command},
    sync::{oneshot, watch},
};

use crate::launch::LaunchPlan;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkerExit {
    /// `None` when the process was killed by a signal or its status was lost.
    pub code: Option<i32>,
}

/// What a spawner hands back: the pid, an exit feed and a kill switch.
pub struct SpawnedWorker {
    pub pid: Option<u32>,
    pub exit: watch::Receiver<Option<WorkerExit>>,
    pub kill: oneshot::Sender<()>,
}

pub trait WorkerSpawner: Send + Sync {
    fn spawn(&self, plan: &LaunchPlan, log: Arc<DiagnosticLog>) -> io::Result<SpawnedWorker>;
}

/// Subscription to the worker's exit. Dropping it unsubscribes.
pub struct ExitSubscription {
    rx: watch::Receiver<Option<WorkerExit>>,
}

impl ExitSubscription {
    /// Resolves once the worker has exited. A monitor that vanished without
    /// reporting counts as an exit with no code.
    pub async fn exited(&mut self) -> WorkerExit {
        match self.rx.wait_for(|v| v.is_some()).await {
            Ok(v) => v.unwrap_or(WorkerExit { code: None }),
            Err(_) => WorkerExit { code: None },
        }
    }

    pub fn try_exit(&self) -> Option<WorkerExit> {
        *self.rx.borrow()
    }

    pub fn cancel(self) {}
}

/// The single live worker process. Owned by the supervisor only.
#[derive(Debug)]
pub struct WorkerHandle {
    pid: Option<u32>,
    working_dir: PathBuf,
    args: Vec<OsString>,
    env: Vec<(String, OsString)>,
    exit: watch::Receiver<Option<WorkerExit>>,
    kill: Option<oneshot::Sender<()>>,
}

impl WorkerHandle {
    pub fn new(plan: &LaunchPlan, spawned: SpawnedWorker) -> Self {
        Self {
            pid: spawned.pid,
            working_dir: plan.working_dir.clone(),
            args: plan.args.clone(),
            env: plan.env.clone(),
            exit: spawned.exit,
            kill: Some(spawned.kill),
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    pub fn env_overrides(&self) -> &[(String, OsString)] {
        &self.env
    }

    pub fn subscribe_exit(&self) -> ExitSubscription {
        ExitSubscription {
            rx: self.exit.clone(),
        }
    }

    pub fn has_exited(&self) -> bool {
        self.exit.borrow().is_some()
    }

    /// Sends the kill signal once. Does not wait for the process to go away.
    pub fn terminate(&mut self) -> bool {
        match self.kill.take() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }
}

/// Spawns the worker as a real OS process with piped stdout/stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandSpawner;

impl WorkerSpawner for CommandSpawner {
    fn spawn(&self, plan: &LaunchPlan, log: Arc<DiagnosticLog>) -> io::Result<SpawnedWorker> {
        let mut cmd = Command::new(&plan.program);
        cmd.args(&plan.args)
            .current_dir(&plan.working_dir)
            .envs(plan.env.iter().map(|(k, v)| (k.as_str(), v.as_os_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        let mut child = cmd.spawn()?;
        let pid = child.id();
        log.info(format!(
            "Worker process spawned (pid {})",
            pid.map(|p| p.to_string()).unwrap_or_else(|| "?".to_string())
        ));

        if let Some(out) = child.stdout.take() {
            tokio::spawn(forward_lines(out, log.clone(), false));
        }
        if let Some(err) = child.stderr.take() {
            tokio::spawn(forward_lines(err, log.clone(), true));
        }

        let (exit_tx, exit_rx) = watch::channel(None);
        let (kill_tx, kill_rx) = oneshot::channel();
        tokio::spawn(monitor(child, kill_rx, exit_tx, log));

        Ok(SpawnedWorker {
            pid,
            exit: exit_rx,
            kill: kill_tx,
        })
    }
}

async fn forward_lines<R>(stream: R, log: Arc<DiagnosticLog>, is_stderr: bool)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if is_stderr => log.error(format!("Worker stderr: {line}"), None),
            Ok(Some(line)) => log.info(format!("Worker: {line}")),
            Ok(None) => return,
            Err(e) => {
                log.error("Worker output read failed", Some(&e.to_string()));
                return;
            }
        }
    }
}

// A dropped kill sender also kills: losing the handle must not orphan the worker.
async fn monitor(
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    exit_tx: watch::Sender<Option<WorkerExit>>,
    log: Arc<DiagnosticLog>,
) {
    let status = tokio::select! {
        s = child.wait() => s,
        _ = kill_rx => {
            if let Err(e) = child.start_kill() {
                log.error("Failed to signal worker process", Some(&e.to_string()));
            }
            child.wait().await
        }
    };
    let exit = match status {
        Ok(s) => WorkerExit { code: s.code() },
        Err(e) => {
            log.error("Failed to wait for worker process", Some(&e.to_string()));
            WorkerExit { code: None }
        }
    };
    let code = exit
        .code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "null".to_string());
    match exit.code {
        Some(0) | None => log.info(format!("Worker process exited with code {code}")),
        Some(_) => log.error(format!("Worker process exited with code {code}"), None),
    }
    let _ = exit_tx.send(Some(exit));
}
