//! Headless helpers for working on the worker without the desktop shell.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use todocx_core::endpoint::{WorkerEndpoint, WORKER_PORT};
use todocx_observability::DiagnosticLog;
use todocx_supervisor::{
    HealthProbe, HttpHealthProbe, LaunchMode, PathsConfig, ProcessSupervisor, RetryPolicy,
};

#[derive(Parser, Debug)]
#[command(name = "todocx-tools")]
#[command(about = "Probe or supervise the conversion worker without the UI", long_about = None)]
struct Args {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Run one health check against a worker that is already running
    Probe {
        #[arg(long, default_value_t = WORKER_PORT)]
        port: u16,
        #[arg(long, default_value_t = 2000)]
        timeout_ms: u64,
    },
    /// Launch the worker, wait until it is ready, keep it up until Ctrl-C
    Supervise {
        /// Development backend root (contains main.py and venv/)
        #[arg(long, value_name = "DIR", default_value = "backend")]
        backend: PathBuf,
        /// Interpreter to use instead of the backend venv
        #[arg(long, value_name = "PATH")]
        python: Option<PathBuf>,
        /// Run the bundled executable from this resources dir instead
        #[arg(long, value_name = "DIR")]
        resources: Option<PathBuf>,
        /// Where app.log and the scratch dir go
        #[arg(long, value_name = "DIR", default_value = "tmp/todocx-data")]
        data_dir: PathBuf,
        #[arg(long, default_value_t = 10)]
        attempts: u32,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    match Args::parse().cmd {
        Cmd::Probe { port, timeout_ms } => probe(port, timeout_ms).await,
        Cmd::Supervise {
            backend,
            python,
            resources,
            data_dir,
            attempts,
        } => {
            let (mode, paths) = match resources {
                Some(res) => (LaunchMode::Packaged, PathsConfig::packaged(&res, &data_dir)),
                None => (
                    LaunchMode::Development,
                    PathsConfig::development(&backend, python),
                ),
            };
            let policy = RetryPolicy {
                max_attempts: attempts,
                ..RetryPolicy::default()
            };
            supervise(mode, paths, &data_dir, policy).await
        }
    }
}

async fn probe(port: u16, timeout_ms: u64) -> Result<()> {
    let probe = HttpHealthProbe::new(&WorkerEndpoint::loopback(port));
    match probe.check(Duration::from_millis(timeout_ms)).await {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report.body)?);
            Ok(())
        }
        Err(e) => bail!("{}: {e}", probe.url()),
    }
}

async fn supervise(
    mode: LaunchMode,
    paths: PathsConfig,
    data_dir: &std::path::Path,
    policy: RetryPolicy,
) -> Result<()> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("create data dir failed: {}", data_dir.display()))?;
    let log = Arc::new(DiagnosticLog::in_dir(data_dir));
    let supervisor = ProcessSupervisor::new(WorkerEndpoint::default(), log.clone()).with_policy(policy);

    let ready = tokio::select! {
        r = supervisor.start(mode, &paths) => r,
        _ = tokio::signal::ctrl_c() => {
            supervisor.stop_and_wait(Duration::from_secs(3)).await;
            return Ok(());
        }
    };
    let ready = match ready {
        Ok(r) => r,
        Err(e) => bail!("{e} (log: {})", log.path().display()),
    };
    println!(
        "worker ready at {} after {} attempt(s), pid {}",
        ready.base_url,
        ready.attempts,
        ready
            .pid
            .map(|p| p.to_string())
            .unwrap_or_else(|| "?".to_string())
    );

    tokio::signal::ctrl_c().await.context("wait for Ctrl-C failed")?;
    if !supervisor.stop_and_wait(Duration::from_secs(3)).await {
        eprintln!("worker did not exit in time");
    }
    Ok(())
}
