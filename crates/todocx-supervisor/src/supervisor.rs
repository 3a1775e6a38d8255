//! Owns the worker process and gates host startup on its readiness.
//!
//! `start()` walks `NotStarted -> Launching -> AwaitingReady -> Ready` and
//! lands in `Failed` on any startup error. `stop()` always ends in `Stopped`.
//! Every transition is written to the diagnostic log.

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use serde::Serialize;
use todocx_core::endpoint::WorkerEndpoint;
use todocx_observability::DiagnosticLog;
use tokio_util::sync::CancellationToken;

use crate::{
    error::SupervisorError,
    health::{HealthProbe, HttpHealthProbe},
    launch::{LaunchMode, LaunchPlan, PathsConfig},
    retry::{self, RetryPolicy, Sleeper, TokioSleeper},
    state::SupervisorState,
    worker::{CommandSpawner, WorkerHandle, WorkerSpawner},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadyInfo {
    pub base_url: String,
    pub attempts: u32,
    pub pid: Option<u32>,
}

struct Inner {
    state: SupervisorState,
    history: Vec<SupervisorState>,
    handle: Option<WorkerHandle>,
}

pub struct ProcessSupervisor {
    endpoint: WorkerEndpoint,
    policy: RetryPolicy,
    spawner: Arc<dyn WorkerSpawner>,
    probe: Arc<dyn HealthProbe>,
    sleeper: Arc<dyn Sleeper>,
    log: Arc<DiagnosticLog>,
    cancel: CancellationToken,
    inner: Mutex<Inner>,
}

impl ProcessSupervisor {
    pub fn new(endpoint: WorkerEndpoint, log: Arc<DiagnosticLog>) -> Self {
        let probe = Arc::new(HttpHealthProbe::new(&endpoint));
        Self {
            endpoint,
            policy: RetryPolicy::default(),
            spawner: Arc::new(CommandSpawner),
            probe,
            sleeper: Arc::new(TokioSleeper),
            log,
            cancel: CancellationToken::new(),
            inner: Mutex::new(Inner {
                state: SupervisorState::NotStarted,
                history: vec![SupervisorState::NotStarted],
                handle: None,
            }),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_spawner(mut self, spawner: Arc<dyn WorkerSpawner>) -> Self {
        self.spawner = spawner;
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn transition(&self, g: &mut Inner, next: SupervisorState) -> bool {
        if !g.state.can_transition_to(next) {
            self.log.info(format!(
                "Supervisor state: ignored {} -> {next}",
                g.state
            ));
            return false;
        }
        self.log
            .info(format!("Supervisor state: {} -> {next}", g.state));
        g.state = next;
        g.history.push(next);
        true
    }

    pub fn state(&self) -> SupervisorState {
        self.lock().state
    }

    /// Every state this instance has been in, oldest first.
    pub fn history(&self) -> Vec<SupervisorState> {
        self.lock().history.clone()
    }

    pub fn endpoint(&self) -> &WorkerEndpoint {
        &self.endpoint
    }

    pub fn log(&self) -> &Arc<DiagnosticLog> {
        &self.log
    }

    /// Base URL of the worker, available only while `Ready`.
    pub fn ready_base_url(&self) -> Result<String, SupervisorState> {
        let state = self.state();
        if state.is_ready() {
            Ok(self.endpoint.base_url())
        } else {
            Err(state)
        }
    }

    pub fn worker_pid(&self) -> Option<u32> {
        self.lock().handle.as_ref().and_then(|h| h.pid())
    }

    fn fail(&self, err: SupervisorError) -> SupervisorError {
        self.log.error_chain("Worker startup failed", &err);
        let mut g = self.lock();
        if let Some(mut h) = g.handle.take() {
            h.terminate();
        }
        self.transition(&mut g, SupervisorState::Failed);
        err
    }

    // A stop() that lands while the plan is being prepared must win: nothing
    // gets spawned once cancellation was requested.
    fn spawn_worker(&self, plan: &LaunchPlan) -> Result<WorkerHandle, SupervisorError> {
        if self.cancel.is_cancelled() {
            self.log.info("Worker launch skipped: shutdown requested");
            return Err(SupervisorError::Cancelled);
        }
        match self.spawner.spawn(plan, self.log.clone()) {
            Ok(spawned) => Ok(WorkerHandle::new(plan, spawned)),
            Err(source) => Err(self.fail(SupervisorError::SpawnFailed {
                program: plan.program.clone(),
                source,
            })),
        }
    }

    pub async fn start(
        &self,
        mode: LaunchMode,
        paths: &PathsConfig,
    ) -> Result<ReadyInfo, SupervisorError> {
        {
            let mut g = self.lock();
            if g.state != SupervisorState::NotStarted {
                return Err(SupervisorError::InvalidState { state: g.state });
            }
            self.transition(&mut g, SupervisorState::Launching);
        }
        self.log
            .info(format!("Starting worker in {} mode...", mode.to_string().to_uppercase()));

        let plan = match LaunchPlan::prepare(mode, paths, &self.log) {
            Ok(p) => p,
            Err(e) => return Err(self.fail(e)),
        };
        let mut handle = self.spawn_worker(&plan)?;
        let pid = handle.pid();
        let mut exit = handle.subscribe_exit();
        {
            let mut g = self.lock();
            if g.state != SupervisorState::Launching {
                // stop() ran while we were spawning.
                handle.terminate();
                return Err(SupervisorError::Cancelled);
            }
            g.handle = Some(handle);
            self.transition(&mut g, SupervisorState::AwaitingReady);
        }

        let waited = retry::wait_until_ready(
            &self.policy,
            self.probe.as_ref(),
            self.sleeper.as_ref(),
            &mut exit,
            &self.cancel,
            &self.log,
        )
        .await;
        // Past this point an exit is no longer a startup failure.
        exit.cancel();

        match waited {
            Ok(report) => {
                let mut g = self.lock();
                if !self.transition(&mut g, SupervisorState::Ready) {
                    return Err(SupervisorError::Cancelled);
                }
                self.log.info("Worker is ready");
                Ok(ReadyInfo {
                    base_url: self.endpoint.base_url(),
                    attempts: report.attempts,
                    pid,
                })
            }
            Err(SupervisorError::Cancelled) => Err(SupervisorError::Cancelled),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Signals the worker (if any) and moves to `Stopped`. Never waits for the
    /// process to exit and is safe to call any number of times.
    pub fn stop(&self) {
        self.cancel.cancel();
        let mut g = self.lock();
        if g.state == SupervisorState::Stopped {
            return;
        }
        self.transition(&mut g, SupervisorState::Stopping);
        if let Some(mut h) = g.handle.take() {
            let pid = h
                .pid()
                .map(|p| p.to_string())
                .unwrap_or_else(|| "?".to_string());
            self.log.info(format!("Stopping worker process (pid {pid})"));
            h.terminate();
        }
        self.transition(&mut g, SupervisorState::Stopped);
    }

    /// `stop()` followed by a bounded wait for the process to go away.
    /// Returns false if the worker was still running when `grace` ran out.
    pub async fn stop_and_wait(&self, grace: Duration) -> bool {
        let sub = self.lock().handle.as_ref().map(|h| h.subscribe_exit());
        self.stop();
        let Some(mut sub) = sub else {
            return true;
        };
        match tokio::time::timeout(grace, sub.exited()).await {
            Ok(_) => true,
            Err(_) => {
                self.log.error(
                    "Worker did not exit within shutdown grace period",
                    Some(&format!("grace_ms={}", grace.as_millis())),
                );
                false
            }
        }
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        let mut g = self.lock();
        if let Some(mut h) = g.handle.take() {
            h.terminate();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        health::{HealthReport, ProbeError},
        launch::ArtifactKind,
        worker::{SpawnedWorker, WorkerExit},
    };
    use futures_util::future::BoxFuture;
    use std::{
        fs, io,
        path::Path,
        sync::atomic::{AtomicU32, Ordering},
    };
    use tokio::sync::{oneshot, watch};
    use SupervisorState::*;

    #[derive(Default)]
    struct FakeSpawner {
        calls: AtomicU32,
        fail: bool,
        exit_tx: Mutex<Option<watch::Sender<Option<WorkerExit>>>>,
        kill_rx: Mutex<Option<oneshot::Receiver<()>>>,
    }

    impl FakeSpawner {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        fn exit_with(&self, code: Option<i32>) {
            if let Some(tx) = self.exit_tx.lock().unwrap().as_ref() {
                let _ = tx.send(Some(WorkerExit { code }));
            }
        }

        fn was_killed(&self) -> bool {
            match self.kill_rx.lock().unwrap().as_mut() {
                Some(rx) => rx.try_recv().is_ok(),
                None => false,
            }
        }
    }

    impl WorkerSpawner for FakeSpawner {
        fn spawn(&self, _plan: &LaunchPlan, _log: Arc<DiagnosticLog>) -> io::Result<SpawnedWorker> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "access denied"));
            }
            let (exit_tx, exit_rx) = watch::channel(None);
            let (kill_tx, kill_rx) = oneshot::channel();
            *self.exit_tx.lock().unwrap() = Some(exit_tx);
            *self.kill_rx.lock().unwrap() = Some(kill_rx);
            Ok(SpawnedWorker {
                pid: Some(4242),
                exit: exit_rx,
                kill: kill_tx,
            })
        }
    }

    enum Script {
        SucceedOn(u32),
        AlwaysFail,
        ExitOn(u32, Arc<FakeSpawner>),
        Hang,
    }

    struct FakeProbe {
        calls: AtomicU32,
        script: Script,
    }

    impl FakeProbe {
        fn new(script: Script) -> Self {
            Self {
                calls: AtomicU32::new(0),
                script,
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl HealthProbe for FakeProbe {
        fn check(&self, _timeout: Duration) -> BoxFuture<'_, Result<HealthReport, ProbeError>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Box::pin(async move {
                match &self.script {
                    Script::SucceedOn(k) if n >= *k => Ok(HealthReport {
                        status: 200,
                        body: serde_json::json!({"status": "ok"}),
                    }),
                    Script::ExitOn(k, spawner) if n == *k => {
                        spawner.exit_with(Some(1));
                        Err(ProbeError::ConnectionRefused("refused".to_string()))
                    }
                    Script::Hang => futures_util::future::pending().await,
                    _ => Err(ProbeError::ConnectionRefused("refused".to_string())),
                }
            })
        }
    }

    #[derive(Default)]
    struct InstantSleeper {
        sleeps: Mutex<Vec<Duration>>,
    }

    impl Sleeper for InstantSleeper {
        fn sleep(&self, d: Duration) -> BoxFuture<'static, ()> {
            self.sleeps.lock().unwrap().push(d);
            Box::pin(tokio::task::yield_now())
        }
    }

    struct Fixture {
        _td: tempfile::TempDir,
        paths: PathsConfig,
        log: Arc<DiagnosticLog>,
    }

    fn fixture() -> Fixture {
        let td = tempfile::tempdir().expect("tempdir");
        let resources = td.path().join("resources");
        let paths = PathsConfig::packaged(&resources, &td.path().join("data"));
        fs::create_dir_all(&paths.working_dir).expect("mkdir");
        fs::write(&paths.program, b"x").expect("write exe");
        let log = Arc::new(DiagnosticLog::quiet(td.path().join("app.log")));
        Fixture {
            _td: td,
            paths,
            log,
        }
    }

    fn supervisor(
        fx: &Fixture,
        spawner: Arc<FakeSpawner>,
        probe: Arc<FakeProbe>,
        sleeper: Arc<InstantSleeper>,
    ) -> ProcessSupervisor {
        ProcessSupervisor::new(WorkerEndpoint::default(), fx.log.clone())
            .with_spawner(spawner)
            .with_probe(probe)
            .with_sleeper(sleeper)
    }

    fn log_text(log: &DiagnosticLog) -> String {
        fs::read_to_string(log.path()).unwrap_or_default()
    }

    #[tokio::test]
    async fn missing_artifact_fails_without_spawning() {
        let fx = fixture();
        let spawner = Arc::new(FakeSpawner::default());
        let probe = Arc::new(FakeProbe::new(Script::SucceedOn(1)));
        let sup = supervisor(&fx, spawner.clone(), probe.clone(), Arc::default());

        let paths = PathsConfig::packaged(Path::new("/definitely/not/here"), Path::new("/tmp"));
        let err = sup.start(LaunchMode::Packaged, &paths).await.unwrap_err();

        assert!(matches!(
            err,
            SupervisorError::MissingArtifact { kind: ArtifactKind::Executable, .. }
        ));
        assert_eq!(spawner.calls(), 0);
        assert_eq!(probe.calls(), 0);
        assert_eq!(sup.state(), Failed);
        assert_eq!(sup.history(), vec![NotStarted, Launching, Failed]);
        assert!(log_text(&fx.log).contains("ERROR: Worker startup failed"));
    }

    #[tokio::test]
    async fn ready_on_tenth_attempt() {
        let fx = fixture();
        let spawner = Arc::new(FakeSpawner::default());
        let probe = Arc::new(FakeProbe::new(Script::SucceedOn(10)));
        let sleeper = Arc::new(InstantSleeper::default());
        let sup = supervisor(&fx, spawner.clone(), probe.clone(), sleeper.clone());

        let ready = sup.start(LaunchMode::Packaged, &fx.paths).await.expect("ready");
        assert_eq!(ready.attempts, 10);
        assert_eq!(ready.base_url, "http://127.0.0.1:8765");
        assert_eq!(ready.pid, Some(4242));
        assert_eq!(probe.calls(), 10);
        assert_eq!(sup.state(), Ready);
        assert_eq!(sup.ready_base_url().as_deref(), Ok("http://127.0.0.1:8765"));

        // One delay before every attempt, including the first.
        let sleeps = sleeper.sleeps.lock().unwrap().clone();
        assert_eq!(sleeps, vec![Duration::from_millis(1000); 10]);
    }

    #[tokio::test]
    async fn always_failing_probe_gives_not_ready_after_ten_attempts() {
        let fx = fixture();
        let spawner = Arc::new(FakeSpawner::default());
        let probe = Arc::new(FakeProbe::new(Script::AlwaysFail));
        let sup = supervisor(&fx, spawner.clone(), probe.clone(), Arc::default());

        let err = sup.start(LaunchMode::Packaged, &fx.paths).await.unwrap_err();
        match &err {
            SupervisorError::NotReady { attempts, last_error } => {
                assert_eq!(*attempts, 10);
                assert!(last_error.contains("connection refused"));
            }
            other => panic!("unexpected: {other}"),
        }
        assert_eq!(probe.calls(), 10);
        assert_eq!(sup.state(), Failed);
        assert!(spawner.was_killed());
        assert!(sup.ready_base_url().is_err());
    }

    #[tokio::test]
    async fn worker_exit_during_polling_rejects_immediately() {
        let fx = fixture();
        let spawner = Arc::new(FakeSpawner::default());
        let probe = Arc::new(FakeProbe::new(Script::ExitOn(2, spawner.clone())));
        let sup = supervisor(&fx, spawner.clone(), probe.clone(), Arc::default());

        let err = sup.start(LaunchMode::Packaged, &fx.paths).await.unwrap_err();
        assert!(matches!(err, SupervisorError::WorkerExited { code: Some(1) }), "{err}");
        assert_eq!(probe.calls(), 2);
        assert_eq!(sup.state(), Failed);
        assert_eq!(sup.history(), vec![NotStarted, Launching, AwaitingReady, Failed]);
    }

    #[tokio::test]
    async fn spawn_error_is_spawn_failed() {
        let fx = fixture();
        let spawner = Arc::new(FakeSpawner::failing());
        let probe = Arc::new(FakeProbe::new(Script::SucceedOn(1)));
        let sup = supervisor(&fx, spawner.clone(), probe.clone(), Arc::default());

        let err = sup.start(LaunchMode::Packaged, &fx.paths).await.unwrap_err();
        assert!(matches!(err, SupervisorError::SpawnFailed { .. }), "{err}");
        assert_eq!(err.code(), "E_SPAWN_FAILED");
        assert_eq!(spawner.calls(), 1);
        assert_eq!(probe.calls(), 0);
        assert_eq!(sup.state(), Failed);
    }

    #[tokio::test]
    async fn start_sequence_and_attempt_log_lines() {
        let fx = fixture();
        let spawner = Arc::new(FakeSpawner::default());
        let probe = Arc::new(FakeProbe::new(Script::SucceedOn(3)));
        let sup = supervisor(&fx, spawner, probe, Arc::default());

        sup.start(LaunchMode::Packaged, &fx.paths).await.expect("ready");
        assert_eq!(sup.history(), vec![NotStarted, Launching, AwaitingReady, Ready]);

        let text = log_text(&fx.log);
        let attempts = text
            .lines()
            .filter(|l| l.contains("Health check attempt"))
            .count();
        assert_eq!(attempts, 3);
        assert!(text.contains("Health check attempt 3/10: ok"));
        assert!(text.contains("Supervisor state: AwaitingReady -> Ready"));
        assert!(text.contains(r#"Worker health: {"status":"ok"}"#));
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let fx = fixture();
        let sup = supervisor(
            &fx,
            Arc::new(FakeSpawner::default()),
            Arc::new(FakeProbe::new(Script::SucceedOn(1))),
            Arc::default(),
        );
        sup.start(LaunchMode::Packaged, &fx.paths).await.expect("ready");
        let err = sup.start(LaunchMode::Packaged, &fx.paths).await.unwrap_err();
        assert!(matches!(err, SupervisorError::InvalidState { state: Ready }));
        assert_eq!(sup.state(), Ready);
    }

    #[test]
    fn stop_without_start_is_idempotent() {
        let fx = fixture();
        let sup = ProcessSupervisor::new(WorkerEndpoint::default(), fx.log.clone());
        sup.stop();
        sup.stop();
        assert_eq!(sup.state(), Stopped);
        assert_eq!(sup.history(), vec![NotStarted, Stopping, Stopped]);
    }

    #[tokio::test]
    async fn stop_after_ready_kills_worker_and_blocks_endpoint() {
        let fx = fixture();
        let spawner = Arc::new(FakeSpawner::default());
        let sup = supervisor(
            &fx,
            spawner.clone(),
            Arc::new(FakeProbe::new(Script::SucceedOn(1))),
            Arc::default(),
        );
        sup.start(LaunchMode::Packaged, &fx.paths).await.expect("ready");
        sup.stop();
        sup.stop();
        assert!(spawner.was_killed());
        assert_eq!(sup.state(), Stopped);
        assert_eq!(sup.worker_pid(), None);
        assert_eq!(sup.ready_base_url(), Err(Stopped));
    }

    #[tokio::test]
    async fn stop_during_start_cancels_it() {
        let fx = fixture();
        let spawner = Arc::new(FakeSpawner::default());
        let sup = Arc::new(supervisor(
            &fx,
            spawner.clone(),
            Arc::new(FakeProbe::new(Script::Hang)),
            Arc::default(),
        ));

        let task = {
            let sup = sup.clone();
            let paths = fx.paths.clone();
            tokio::spawn(async move { sup.start(LaunchMode::Packaged, &paths).await })
        };
        while sup.state() != AwaitingReady {
            tokio::task::yield_now().await;
        }
        sup.stop();

        let res = task.await.expect("join");
        assert!(matches!(res, Err(SupervisorError::Cancelled)));
        assert_eq!(sup.state(), Stopped);
        assert!(spawner.was_killed());
    }

    #[tokio::test]
    async fn stop_before_spawn_skips_the_launch() {
        let fx = fixture();
        let spawner = Arc::new(FakeSpawner::default());
        let sup = supervisor(
            &fx,
            spawner.clone(),
            Arc::new(FakeProbe::new(Script::SucceedOn(1))),
            Arc::default(),
        );
        {
            let mut g = sup.lock();
            sup.transition(&mut g, Launching);
        }
        let plan = LaunchPlan::prepare(LaunchMode::Packaged, &fx.paths, &fx.log).expect("plan");
        sup.stop();

        let err = sup.spawn_worker(&plan).unwrap_err();
        assert!(matches!(err, SupervisorError::Cancelled));
        assert_eq!(spawner.calls(), 0);
        assert_eq!(sup.state(), Stopped);
        assert_eq!(sup.worker_pid(), None);
        assert!(log_text(&fx.log).contains("Worker launch skipped: shutdown requested"));
    }

    #[tokio::test]
    async fn stop_and_wait_returns_true_when_worker_exits_in_time() {
        let fx = fixture();
        let spawner = Arc::new(FakeSpawner::default());
        let sup = supervisor(
            &fx,
            spawner.clone(),
            Arc::new(FakeProbe::new(Script::SucceedOn(1))),
            Arc::default(),
        );
        sup.start(LaunchMode::Packaged, &fx.paths).await.expect("ready");

        // Stand-in for the monitor task: exit as soon as the kill arrives.
        let reaper = {
            let spawner = spawner.clone();
            tokio::spawn(async move {
                while !spawner.was_killed() {
                    tokio::task::yield_now().await;
                }
                spawner.exit_with(None);
            })
        };

        assert!(sup.stop_and_wait(Duration::from_secs(2)).await);
        reaper.await.expect("join");
        assert_eq!(sup.state(), Stopped);
        assert!(!log_text(&fx.log).contains("did not exit within shutdown grace period"));
    }

    #[tokio::test]
    async fn stop_and_wait_times_out_when_worker_lingers() {
        let fx = fixture();
        let spawner = Arc::new(FakeSpawner::default());
        let sup = supervisor(
            &fx,
            spawner.clone(),
            Arc::new(FakeProbe::new(Script::SucceedOn(1))),
            Arc::default(),
        );
        sup.start(LaunchMode::Packaged, &fx.paths).await.expect("ready");

        // The fake never exits on its own, so the grace period runs out.
        assert!(!sup.stop_and_wait(Duration::from_millis(20)).await);
        assert_eq!(sup.state(), Stopped);
        // Nothing left to wait for.
        assert!(sup.stop_and_wait(Duration::from_millis(20)).await);
    }
}
