use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use tauri::{AppHandle, Manager, Runtime, WebviewUrl, WebviewWindowBuilder};
use tauri_plugin_dialog::{DialogExt, MessageDialogButtons, MessageDialogKind};
use todocx_bridge::Bridge;
use todocx_core::{
    endpoint::WorkerEndpoint,
    env::{env_bool, env_path},
};
use todocx_observability::{DiagnosticLog, Tracer};
use todocx_supervisor::{LaunchMode, PathsConfig, ProcessSupervisor, SupervisorError};

use crate::host::TauriHost;

pub const MAIN_WINDOW_LABEL: &str = "main";
pub const WINDOW_TITLE: &str = "ToDocx";
pub const DEV_SERVER_URL: &str = "http://localhost:20000";
pub const FATAL_TITLE: &str = "Startup failed";
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

pub const DEV_ENV: &str = "TODOCX_DEV";
pub const DEV_FLAG: &str = "--dev";
pub const BACKEND_DIR_ENV: &str = "TODOCX_BACKEND_DIR";
pub const PYTHON_ENV: &str = "TODOCX_PYTHON";

/// `--dev` wins, then an explicit `TODOCX_DEV`, then the build profile.
pub fn launch_mode(args: &[String], dev_env: Option<&str>, debug_build: bool) -> LaunchMode {
    if args.iter().any(|a| a == DEV_FLAG) {
        return LaunchMode::Development;
    }
    let from_env = dev_env.map(|v| v.trim().to_ascii_lowercase());
    match from_env.as_deref() {
        Some("1" | "true" | "yes" | "on") => LaunchMode::Development,
        Some("0" | "false" | "no" | "off") => LaunchMode::Packaged,
        _ if debug_build => LaunchMode::Development,
        _ => LaunchMode::Packaged,
    }
}

pub fn detect_launch_mode() -> LaunchMode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let dev_env = std::env::var(DEV_ENV).ok();
    launch_mode(&args, dev_env.as_deref(), cfg!(debug_assertions))
}

// Dev default: <repo-root>/backend
fn default_backend_root() -> PathBuf {
    let manifest = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    match manifest.ancestors().nth(3) {
        Some(root) => root.join("backend"),
        None => manifest.join("backend"),
    }
}

pub fn resolve_paths(mode: LaunchMode, resource_dir: &Path, data_dir: &Path) -> PathsConfig {
    match mode {
        LaunchMode::Development => {
            let backend = env_path(BACKEND_DIR_ENV).unwrap_or_else(default_backend_root);
            PathsConfig::development(&backend, env_path(PYTHON_ENV))
        }
        LaunchMode::Packaged => PathsConfig::packaged(resource_dir, data_dir),
    }
}

pub fn log_startup_environment(
    log: &DiagnosticLog,
    version: &str,
    mode: LaunchMode,
    data_dir: &Path,
    resource_dir: &Path,
) {
    log.info("=== Application Starting ===");
    log.info(format!("App version: {version}"));
    log.info(format!(
        "Platform: {} {}",
        std::env::consts::OS,
        std::env::consts::ARCH
    ));
    log.info(format!("Launch mode: {mode}"));
    log.info(format!("User data: {}", data_dir.display()));
    log.info(format!("Resources: {}", resource_dir.display()));
    if env_bool(DEV_ENV) {
        log.info(format!("{DEV_ENV} is set"));
    }
}

/// An exit request raised because the last window closed leaves macOS apps
/// running in the dock. Explicit exits (menu Quit, fatal startup) carry a code.
pub fn keep_running_without_windows(exit_code: Option<i32>, macos: bool) -> bool {
    macos && exit_code.is_none()
}

pub fn fatal_message(reason: &str, log_path: &Path) -> String {
    format!(
        "Failed to start the conversion service:\n{reason}\n\nCheck logs at: {}",
        log_path.display()
    )
}

/// Everything the host owns for one run of the application.
pub struct HostLifecycle {
    pub supervisor: Arc<ProcessSupervisor>,
    pub bridge: Arc<Bridge>,
    pub log: Arc<DiagnosticLog>,
    pub tracer: Tracer,
    pub mode: LaunchMode,
    paths: PathsConfig,
}

impl HostLifecycle {
    pub fn init<R: Runtime>(app: &AppHandle<R>) -> Result<Self> {
        let data_dir = crate::data_dir::data_dir().context("resolve data dir failed")?;
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("create data dir failed: {}", data_dir.display()))?;
        let log = Arc::new(DiagnosticLog::in_dir(&data_dir));
        let tracer = Tracer::new(&data_dir);

        let mode = detect_launch_mode();
        let resource_dir = app
            .path()
            .resource_dir()
            .context("resolve resource dir failed")?;
        log_startup_environment(
            &log,
            &app.package_info().version.to_string(),
            mode,
            &data_dir,
            &resource_dir,
        );

        let supervisor = Arc::new(ProcessSupervisor::new(WorkerEndpoint::default(), log.clone()));
        let host = Arc::new(TauriHost::new(app.clone(), data_dir.clone()));
        let bridge = Arc::new(
            Bridge::new(supervisor.clone(), host)
                .with_log(log.clone())
                .with_tracer(tracer.clone()),
        );
        let paths = resolve_paths(mode, &resource_dir, &data_dir);

        Ok(Self {
            supervisor,
            bridge,
            log,
            tracer,
            mode,
            paths,
        })
    }

    /// Starts the worker off the event loop. The main window appears only
    /// once the worker answers its health check; any startup failure ends
    /// the app after the error dialog is dismissed.
    pub fn start_worker<R: Runtime>(&self, app: AppHandle<R>) {
        let supervisor = self.supervisor.clone();
        let log = self.log.clone();
        let tracer = self.tracer.clone();
        let mode = self.mode;
        let paths = self.paths.clone();

        tauri::async_runtime::spawn(async move {
            let span = tracer.span(
                None,
                "Host",
                "HOST.start_worker",
                Some(serde_json::json!({ "mode": mode })),
            );
            match supervisor.start(mode, &paths).await {
                Ok(ready) => {
                    span.ok(Some(serde_json::json!({
                        "attempts": ready.attempts,
                        "pid": ready.pid,
                    })));
                    if let Err(e) = create_main_window(&app, mode) {
                        log.error("Failed to create main window", Some(&format!("{e:#}")));
                        show_fatal_and_exit(&app, &log, &format!("{e:#}"));
                    }
                }
                Err(SupervisorError::Cancelled) => {
                    span.err("process", SupervisorError::Cancelled.code(), "cancelled", None);
                    log.info("Worker startup cancelled by shutdown");
                }
                Err(e) => {
                    span.err_chain("process", e.code(), &e, None);
                    show_fatal_and_exit(&app, &log, &e.to_string());
                }
            }
        });
    }

    /// Recreates the main window after it was closed, as the dock icon does
    /// on macOS. Does nothing until the worker is ready.
    pub fn reopen_main_window<R: Runtime>(&self, app: &AppHandle<R>) {
        if app.get_webview_window(MAIN_WINDOW_LABEL).is_some() {
            focus_main_window(app);
            return;
        }
        if !self.supervisor.state().is_ready() {
            return;
        }
        self.log.info("Reopening main window");
        if let Err(e) = create_main_window(app, self.mode) {
            self.log
                .error("Failed to reopen main window", Some(&format!("{e:#}")));
        }
    }

    /// Best-effort; runs on every exit path.
    pub fn shutdown(&self) {
        self.log.info("Application shutting down");
        let exited =
            tauri::async_runtime::block_on(self.supervisor.stop_and_wait(SHUTDOWN_GRACE));
        if exited {
            self.log.info("Worker stopped");
        }
        self.tracer.event(
            "Host",
            "HOST.shutdown",
            if exited { "ok" } else { "timeout" },
            Some(serde_json::json!({ "grace_ms": SHUTDOWN_GRACE.as_millis() })),
        );
    }
}

fn create_main_window<R: Runtime>(app: &AppHandle<R>, mode: LaunchMode) -> Result<()> {
    let url = match mode {
        LaunchMode::Development => WebviewUrl::External(
            DEV_SERVER_URL
                .parse()
                .context("parse dev server url failed")?,
        ),
        LaunchMode::Packaged => WebviewUrl::App("index.html".into()),
    };
    let window = WebviewWindowBuilder::new(app, MAIN_WINDOW_LABEL, url)
        .title(WINDOW_TITLE)
        .inner_size(1200.0, 800.0)
        .min_inner_size(800.0, 600.0)
        .build()
        .context("build main window failed")?;

    #[cfg(debug_assertions)]
    if mode == LaunchMode::Development {
        window.open_devtools();
    }
    #[cfg(not(debug_assertions))]
    let _ = window;
    Ok(())
}

fn show_fatal_and_exit<R: Runtime>(app: &AppHandle<R>, log: &DiagnosticLog, reason: &str) {
    let handle = app.clone();
    app.dialog()
        .message(fatal_message(reason, log.path()))
        .title(FATAL_TITLE)
        .kind(MessageDialogKind::Error)
        .buttons(MessageDialogButtons::Ok)
        .show(move |_| handle.exit(1));
}

/// Second launch: bring the running window forward instead of starting
/// another worker on the same port.
pub fn focus_main_window<R: Runtime>(app: &AppHandle<R>) {
    if let Some(w) = app.get_webview_window(MAIN_WINDOW_LABEL) {
        let _ = w.unminimize();
        let _ = w.set_focus();
    }
}
