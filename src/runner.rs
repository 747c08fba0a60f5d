//! Run orchestration.
//!
//! The runner validates configuration fail-fast, wires generator → pool →
//! history, runs the per-process operation loop against the client, and
//! finalizes the history into a summary and optional reports. Per-process
//! failures are recorded and logged, never fatal to sibling processes; only
//! configuration errors abort a run before it starts.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::backend::{yield_now, ProcessFuture, ThreadKind};
use crate::client::Client;
use crate::error::{SquallError, SquallResult};
use crate::generator::{BoxOpGenerator, Generator, GeneratorExt};
use crate::history::History;
use crate::nemesis::Nemesis;
use crate::op::{Op, OpType};
use crate::pool::ThreadPool;

/// What a test drives: the system-under-test client and the operation
/// generator, plus an optional fault-injection actor.
pub struct Workload {
    pub client: Arc<dyn Client>,
    pub generator: Option<BoxOpGenerator>,
    pub nemesis: Option<Arc<dyn Nemesis>>,
}

impl Workload {
    pub fn new(client: Arc<dyn Client>, generator: BoxOpGenerator) -> Self {
        Self {
            client,
            generator: Some(generator),
            nemesis: None,
        }
    }

    pub fn with_nemesis(mut self, nemesis: Arc<dyn Nemesis>) -> Self {
        self.nemesis = Some(nemesis);
        self
    }
}

/// Test options, deserializable from configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TestOptions {
    /// Persist `history.txt` / `history.json` under `report_dir` after the
    /// run.
    pub create_reports: bool,
    /// Number of logical processes.
    pub threads: usize,
    /// Concurrency backend, `"coroutine"` or `"fiber"`.
    pub thread_type: ThreadKind,
    /// Wall-time budget for the generator, measured from its first pull.
    #[serde(with = "humantime_serde")]
    pub time_limit: Option<Duration>,
    /// Nodes handed to the nemesis, if one is attached.
    pub nodes: Vec<String>,
    pub report_dir: PathBuf,
    /// Fixed seed for reproducible cooperative scheduling.
    pub seed: Option<u64>,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            create_reports: false,
            threads: 1,
            thread_type: ThreadKind::Coroutine,
            time_limit: None,
            nodes: Vec::new(),
            report_dir: PathBuf::from("reports"),
            seed: None,
        }
    }
}

/// Result of a finished run. `ok` is true whenever the pool ran to
/// completion — per-process client failures are evidence in the history and
/// logs, not run failures.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub ok: bool,
    pub planned: usize,
    pub completed: usize,
    pub elapsed: Duration,
    pub history: History,
}

/// Validates options once, then executes workloads against them.
#[derive(Debug)]
pub struct Runner {
    options: TestOptions,
}

impl Runner {
    /// Fails fast on invalid options, before any concurrency starts.
    pub fn new(options: TestOptions) -> SquallResult<Self> {
        if options.threads == 0 {
            return Err(SquallError::config("test options: threads must be > 0"));
        }
        Ok(Self { options })
    }

    pub fn options(&self) -> &TestOptions {
        &self.options
    }

    /// Execute one workload: validate it, spin up the pool, drive every
    /// logical process until the generator is exhausted, join, summarize,
    /// and optionally persist reports.
    pub async fn run(&self, workload: Workload) -> SquallResult<RunOutcome> {
        let generator = workload
            .generator
            .ok_or_else(|| SquallError::config("workload generator is missing"))?;
        let generator: BoxOpGenerator = match self.options.time_limit {
            Some(limit) => generator.time_limit(limit)?.boxed(),
            None => generator,
        };

        let mut pool = match self.options.seed {
            Some(seed) => ThreadPool::seeded(self.options.thread_type, self.options.threads, seed)?,
            None => ThreadPool::new(self.options.thread_type, self.options.threads)?,
        };

        if let Some(nemesis) = &workload.nemesis {
            if let Err(err) = nemesis.setup(&self.options.nodes).await {
                warn!(error = %err, "nemesis setup failed; continuing without faults");
            }
        }

        let history = History::new();
        let shared = Arc::new(Mutex::new(generator));
        let started = Instant::now();

        info!(
            threads = self.options.threads,
            backend = %pool.kind(),
            "starting workload"
        );

        let entry = {
            let shared = Arc::clone(&shared);
            let history = history.clone();
            let client = Arc::clone(&workload.client);
            move |process: u64| -> ProcessFuture {
                let generator = Arc::clone(&shared);
                let history = history.clone();
                let client = Arc::clone(&client);
                run_process(process, generator, history, client).boxed()
            }
        };
        pool.start(entry).await?;

        if let Some(nemesis) = &workload.nemesis {
            if let Err(err) = nemesis.teardown(&self.options.nodes).await {
                warn!(error = %err, "nemesis teardown failed");
            }
        }

        let elapsed = started.elapsed();
        let planned = history.ops_planned();
        let completed = history.ops_completed();
        let throughput = completed as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
        info!(
            planned,
            completed,
            elapsed_ms = elapsed.as_millis() as u64,
            ops_per_sec = throughput,
            "workload finished"
        );

        if self.options.create_reports {
            self.write_reports(&history)?;
        }

        Ok(RunOutcome {
            ok: true,
            planned,
            completed,
            elapsed,
            history,
        })
    }

    fn write_reports(&self, history: &History) -> SquallResult<()> {
        fs::create_dir_all(&self.options.report_dir)?;
        fs::write(self.options.report_dir.join("history.txt"), history.to_txt())?;
        fs::write(
            self.options.report_dir.join("history.json"),
            history.to_json()?,
        )?;
        info!(dir = %self.options.report_dir.display(), "wrote history reports");
        Ok(())
    }
}

/// Validate options and execute `workload` in one call.
pub async fn run_workload(workload: Workload, options: TestOptions) -> SquallResult<RunOutcome> {
    Runner::new(options)?.run(workload).await
}

/// One logical process: pull, invoke, record, repeat until the shared
/// generator is exhausted. Client hook failures are logged and absorbed
/// here; only an `invoke` error ends the loop early, leaving its dangling
/// invocation in the history.
async fn run_process(
    process: u64,
    generator: Arc<Mutex<BoxOpGenerator>>,
    history: History,
    client: Arc<dyn Client>,
) {
    if let Err(err) = client.open().await {
        warn!(process, error = %err, "client open failed");
    }
    if let Err(err) = client.setup().await {
        warn!(process, error = %err, "client setup failed; continuing");
    }

    loop {
        let item = { generator.lock().next_item() };
        let item = match item {
            Some(item) => item,
            None => break,
        };

        let template = item.materialize();
        let invoke = history.add(Op {
            op_type: OpType::Invoke,
            process,
            ..template
        });

        yield_now().await;
        match client.invoke(invoke.clone()).await {
            Ok(mut completion) => {
                if completion.op_type == OpType::Invoke {
                    warn!(
                        process,
                        f = %invoke.f,
                        "client returned a non-terminal operation; recording as info"
                    );
                    completion.op_type = OpType::Info;
                }
                // Completions carry the f and process of the invocation they
                // close out, whatever the client handed back.
                completion.f = invoke.f.clone();
                completion.process = process;
                completion.index = None;
                completion.time = None;
                history.add(completion);
            }
            Err(err) => {
                error!(
                    process,
                    f = %invoke.f,
                    error = %err,
                    "client invoke failed; abandoning this process's loop"
                );
                break;
            }
        }
        yield_now().await;
    }

    if let Err(err) = client.teardown().await {
        warn!(process, error = %err, "client teardown failed");
    }
    if let Err(err) = client.close().await {
        warn!(process, error = %err, "client close failed");
    }
}
