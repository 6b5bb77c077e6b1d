//! Fixed-order stage orchestration.
//!
//! A run walks Collect → Persist → Transform → Enrich. Each stage starts only
//! after its predecessor succeeded; the first failure halts the run and leaves
//! every later stage Pending. Nothing is retried here. Repeating a whole run
//! is safe because persistence and enrichment skip rows that already exist.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{error, info};
use uuid::Uuid;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Collect,
    Persist,
    Transform,
    Enrich,
}

impl StageKind {
    pub const ORDER: [StageKind; 4] = [
        StageKind::Collect,
        StageKind::Persist,
        StageKind::Transform,
        StageKind::Enrich,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn predecessor(self) -> Option<StageKind> {
        self.index().checked_sub(1).map(|i| Self::ORDER[i])
    }

    pub fn name(self) -> &'static str {
        match self {
            StageKind::Collect => "collect",
            StageKind::Persist => "persist",
            StageKind::Transform => "transform",
            StageKind::Enrich => "enrich",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl StageState {
    pub fn is_terminal(self) -> bool {
        matches!(self, StageState::Succeeded | StageState::Failed)
    }
}

/// One unit of the pipeline.
#[async_trait]
pub trait Stage: Send + Sync {
    async fn run(&self) -> Result<()>;
}

/// In-memory state of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    id: Uuid,
    states: [StageState; 4],
}

impl Default for PipelineRun {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineRun {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            states: [StageState::Pending; 4],
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self, stage: StageKind) -> StageState {
        self.states[stage.index()]
    }

    /// Pending → Running, allowed only once the predecessor has succeeded.
    pub fn start(&mut self, stage: StageKind) -> bool {
        let ready = self.state(stage) == StageState::Pending
            && stage
                .predecessor()
                .is_none_or(|prev| self.state(prev) == StageState::Succeeded);
        if ready {
            self.states[stage.index()] = StageState::Running;
        }
        ready
    }

    /// Running → Succeeded or Failed. Ignored for a stage that is not running.
    pub fn finish(&mut self, stage: StageKind, succeeded: bool) {
        if self.state(stage) == StageState::Running {
            self.states[stage.index()] = if succeeded {
                StageState::Succeeded
            } else {
                StageState::Failed
            };
        }
    }

    pub fn succeeded_stages(&self) -> Vec<StageKind> {
        StageKind::ORDER
            .into_iter()
            .filter(|s| self.state(*s) == StageState::Succeeded)
            .collect()
    }
}

/// The stage that halted a run and why.
#[derive(Debug)]
pub struct StageFailure {
    pub stage: StageKind,
    pub error: Error,
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage {} failed: {}", self.stage, self.error)
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub run: PipelineRun,
    pub failure: Option<StageFailure>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

pub struct Orchestrator {
    collect: Arc<dyn Stage>,
    persist: Arc<dyn Stage>,
    transform: Arc<dyn Stage>,
    enrich: Arc<dyn Stage>,
}

impl Orchestrator {
    pub fn new(
        collect: Arc<dyn Stage>,
        persist: Arc<dyn Stage>,
        transform: Arc<dyn Stage>,
        enrich: Arc<dyn Stage>,
    ) -> Self {
        Self {
            collect,
            persist,
            transform,
            enrich,
        }
    }

    fn stage(&self, kind: StageKind) -> &dyn Stage {
        match kind {
            StageKind::Collect => self.collect.as_ref(),
            StageKind::Persist => self.persist.as_ref(),
            StageKind::Transform => self.transform.as_ref(),
            StageKind::Enrich => self.enrich.as_ref(),
        }
    }

    pub async fn run(&self) -> RunReport {
        let mut run = PipelineRun::new();
        info!("Pipeline run {} started", run.id());

        for kind in StageKind::ORDER {
            if !run.start(kind) {
                break;
            }
            info!("Run {}: stage {} running", run.id(), kind);
            let started = Instant::now();

            match self.stage(kind).run().await {
                Ok(()) => {
                    run.finish(kind, true);
                    info!(
                        "Run {}: stage {} succeeded in {:.1?}",
                        run.id(),
                        kind,
                        started.elapsed()
                    );
                }
                Err(e) => {
                    run.finish(kind, false);
                    error!("Run {}: stage {} failed: {}", run.id(), kind, e);
                    return RunReport {
                        run,
                        failure: Some(StageFailure {
                            stage: kind,
                            error: e,
                        }),
                    };
                }
            }
        }

        info!("Pipeline run {} succeeded", run.id());
        RunReport { run, failure: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records its invocation and optionally fails.
    struct ProbeStage {
        kind: StageKind,
        fail: bool,
        log: Arc<Mutex<Vec<StageKind>>>,
    }

    #[async_trait]
    impl Stage for ProbeStage {
        async fn run(&self) -> Result<()> {
            self.log.lock().unwrap().push(self.kind);
            if self.fail {
                return Err(Error::Transform(format!("{} forced to fail", self.kind)));
            }
            Ok(())
        }
    }

    fn orchestrator(failing: Option<StageKind>) -> (Orchestrator, Arc<Mutex<Vec<StageKind>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let probe = |kind: StageKind| -> Arc<dyn Stage> {
            Arc::new(ProbeStage {
                kind,
                fail: failing == Some(kind),
                log: log.clone(),
            })
        };
        let orchestrator = Orchestrator::new(
            probe(StageKind::Collect),
            probe(StageKind::Persist),
            probe(StageKind::Transform),
            probe(StageKind::Enrich),
        );
        (orchestrator, log)
    }

    #[tokio::test]
    async fn runs_all_stages_in_order() {
        let (orchestrator, log) = orchestrator(None);

        let report = orchestrator.run().await;

        assert!(report.succeeded());
        assert_eq!(*log.lock().unwrap(), StageKind::ORDER.to_vec());
        assert_eq!(report.run.succeeded_stages(), StageKind::ORDER.to_vec());
    }

    #[tokio::test]
    async fn failed_persist_halts_the_run() {
        let (orchestrator, log) = orchestrator(Some(StageKind::Persist));

        let report = orchestrator.run().await;

        assert!(!report.succeeded());
        assert_eq!(*log.lock().unwrap(), vec![StageKind::Collect, StageKind::Persist]);
        let failure = report.failure.as_ref().unwrap();
        assert_eq!(failure.stage, StageKind::Persist);
        assert!(failure.to_string().contains("stage persist failed"));

        assert_eq!(report.run.state(StageKind::Collect), StageState::Succeeded);
        assert_eq!(report.run.state(StageKind::Persist), StageState::Failed);
        assert_eq!(report.run.state(StageKind::Transform), StageState::Pending);
        assert_eq!(report.run.state(StageKind::Enrich), StageState::Pending);
        assert_eq!(report.run.succeeded_stages(), vec![StageKind::Collect]);
    }

    #[test]
    fn stage_cannot_start_before_predecessor_succeeds() {
        let mut run = PipelineRun::new();

        assert!(!run.start(StageKind::Persist));
        assert!(run.start(StageKind::Collect));
        assert!(!run.start(StageKind::Collect));
        assert!(!run.start(StageKind::Persist));

        run.finish(StageKind::Collect, true);
        assert!(run.state(StageKind::Collect).is_terminal());
        assert!(run.start(StageKind::Persist));

        run.finish(StageKind::Persist, false);
        assert!(!run.start(StageKind::Transform));
        assert_eq!(run.state(StageKind::Transform), StageState::Pending);
    }

    #[test]
    fn finish_ignores_stages_that_are_not_running() {
        let mut run = PipelineRun::new();
        run.finish(StageKind::Enrich, true);
        assert_eq!(run.state(StageKind::Enrich), StageState::Pending);
    }

    #[test]
    fn predecessors_follow_the_fixed_order() {
        assert_eq!(StageKind::Collect.predecessor(), None);
        assert_eq!(StageKind::Persist.predecessor(), Some(StageKind::Collect));
        assert_eq!(StageKind::Enrich.predecessor(), Some(StageKind::Transform));
    }
}
