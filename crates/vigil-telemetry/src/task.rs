//! Supervised fire-and-forget background tasks
//!
//! A task refuses to start once its cancellation token has fired, and a panic
//! inside it is logged, counted, and handed to an optional callback instead of
//! tearing down the runtime worker.

use std::fmt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use futures::FutureExt as _;
use opentelemetry::Context;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::Telemetry;
use crate::metrics::{Counter, TASK_PANIC_COUNT};
use crate::propagation::attach;
use crate::recover::{PanicReport, log_panic};

/// Callback invoked with every recovered task panic
pub type PanicHandler = Arc<dyn Fn(&Context, &PanicReport) + Send + Sync>;

/// How a supervised task finished
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    /// The task ran to completion
    Completed,
    /// The task never ran because its token was cancelled, or it was aborted
    Cancelled,
    /// The task panicked and the panic was recovered
    Panicked(PanicReport),
}

impl TaskOutcome {
    /// Convert into a `Result`, treating anything but completion as an error
    ///
    /// # Errors
    ///
    /// Returns the reason the task did not complete
    pub fn into_result(self) -> Result<(), TaskError> {
        match self {
            Self::Completed => Ok(()),
            Self::Cancelled => Err(TaskError::Cancelled),
            Self::Panicked(report) => Err(TaskError::Panicked(report.message)),
        }
    }
}

/// Reason a supervised task did not complete
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("task cancelled before completion")]
    Cancelled,
    #[error("task panicked: {0}")]
    Panicked(String),
}

/// Launches background tasks with panic containment
#[derive(Clone)]
pub struct TaskSupervisor {
    telemetry: Telemetry,
    panics: Arc<dyn Counter>,
    on_panic: Option<PanicHandler>,
}

impl TaskSupervisor {
    pub fn new(telemetry: Telemetry) -> Self {
        let panics = telemetry.monitor().counter(TASK_PANIC_COUNT);
        Self {
            telemetry,
            panics,
            on_panic: None,
        }
    }

    /// Invoke `handler` after a task panic has been logged and counted
    #[must_use]
    pub fn with_panic_handler(mut self, handler: impl Fn(&Context, &PanicReport) + Send + Sync + 'static) -> Self {
        self.on_panic = Some(Arc::new(handler));
        self
    }

    /// Spawn `task` on the current tokio runtime
    ///
    /// Nothing is spawned when `token` is already cancelled. The token is
    /// checked again once the task is scheduled, and `cx` is attached as the
    /// current context while the task runs.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime
    pub fn spawn<F, Fut>(&self, token: &CancellationToken, cx: &Context, task: F) -> TaskHandle
    where
        F: FnOnce(Context, CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if token.is_cancelled() {
            return TaskHandle { join: None };
        }

        let supervisor = self.clone();
        let token = token.clone();
        let cx = cx.clone();

        let join = tokio::spawn(async move {
            if token.is_cancelled() {
                return TaskOutcome::Cancelled;
            }

            let run = attach(cx.clone(), {
                let cx = cx.clone();
                async move { task(cx, token).await }
            });

            match AssertUnwindSafe(run).catch_unwind().await {
                Ok(()) => TaskOutcome::Completed,
                Err(payload) => {
                    let report = PanicReport::capture(payload.as_ref());
                    supervisor.recover(&cx, &report);
                    TaskOutcome::Panicked(report)
                }
            }
        });

        TaskHandle { join: Some(join) }
    }

    fn recover(&self, cx: &Context, report: &PanicReport) {
        log_panic(self.telemetry.logger(), cx, "task_panic", report, &[]);
        self.panics.inc(&[]);

        if let Some(handler) = &self.on_panic {
            let _ = catch_unwind(AssertUnwindSafe(|| handler(cx, report)));
        }
    }
}

impl fmt::Debug for TaskSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSupervisor")
            .field("telemetry", &self.telemetry)
            .field("on_panic", &self.on_panic.is_some())
            .finish_non_exhaustive()
    }
}

/// Handle to a supervised task
#[derive(Debug)]
pub struct TaskHandle {
    join: Option<JoinHandle<TaskOutcome>>,
}

impl TaskHandle {
    /// Whether the task was handed to the runtime
    pub const fn started(&self) -> bool {
        self.join.is_some()
    }

    /// Wait for the task to finish
    pub async fn join(self) -> TaskOutcome {
        let Some(join) = self.join else {
            return TaskOutcome::Cancelled;
        };

        match join.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => TaskOutcome::Panicked(PanicReport::capture(e.into_panic().as_ref())),
            Err(_) => TaskOutcome::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use opentelemetry::baggage::BaggageExt;

    use super::*;
    use crate::testing::{CapturingLogger, CapturingMonitor};
    use crate::trace::{get_baggage, set_baggage};

    fn supervisor() -> (TaskSupervisor, Arc<CapturingLogger>, Arc<CapturingMonitor>) {
        let logger = Arc::new(CapturingLogger::new());
        let monitor = Arc::new(CapturingMonitor::new());
        let telemetry = Telemetry::new()
            .with_logger(logger.clone())
            .with_monitor(monitor.clone());
        (TaskSupervisor::new(telemetry), logger, monitor)
    }

    #[tokio::test]
    async fn completed_task() {
        let (supervisor, logger, _) = supervisor();
        let ran = Arc::new(AtomicBool::new(false));

        let flag = ran.clone();
        let handle = supervisor.spawn(&CancellationToken::new(), &Context::new(), move |_, _| async move {
            flag.store(true, Ordering::SeqCst);
        });

        assert!(handle.started());
        assert!(matches!(handle.join().await, TaskOutcome::Completed));
        assert!(ran.load(Ordering::SeqCst));
        assert!(logger.entries().is_empty());
    }

    #[tokio::test]
    async fn cancelled_token_never_starts() {
        let (supervisor, _, _) = supervisor();
        let token = CancellationToken::new();
        token.cancel();

        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let handle = supervisor.spawn(&token, &Context::new(), move |_, _| async move {
            flag.store(true, Ordering::SeqCst);
        });

        assert!(!handle.started());
        assert_eq!(handle.join().await.into_result(), Err(TaskError::Cancelled));
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn panic_is_logged_counted_and_reported() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (supervisor, logger, monitor) = supervisor();
        let seen = calls.clone();
        let supervisor = supervisor.with_panic_handler(move |_, report| {
            assert_eq!(report.message, "worker exploded");
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let handle = supervisor.spawn(&CancellationToken::new(), &Context::new(), |_, _| async {
            panic!("worker exploded");
        });

        let outcome = handle.join().await;
        assert!(matches!(&outcome, TaskOutcome::Panicked(report) if report.message == "worker exploded"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!((monitor.counter_total(TASK_PANIC_COUNT) - 1.0).abs() < f64::EPSILON);

        let entry = logger.last().unwrap();
        assert_eq!(entry.message, "task_panic");
        assert_eq!(entry.field("panic").as_deref(), Some("worker exploded"));
        assert!(entry.field("stack").is_some());
    }

    #[tokio::test]
    async fn panicking_callback_is_swallowed() {
        let (supervisor, _, monitor) = supervisor();
        let supervisor = supervisor.with_panic_handler(|_, _| panic!("callback exploded"));

        let handle = supervisor.spawn(&CancellationToken::new(), &Context::new(), |_, _| async {
            panic!("worker exploded");
        });

        assert!(matches!(handle.join().await, TaskOutcome::Panicked(_)));
        assert!((monitor.counter_total(TASK_PANIC_COUNT) - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn task_sees_parent_context() {
        let (supervisor, _, _) = supervisor();
        let cx = set_baggage(&Context::new(), "tenant", "acme");

        let (tx, rx) = tokio::sync::oneshot::channel();
        let handle = supervisor.spawn(&CancellationToken::new(), &cx, move |cx, _| async move {
            let current = Context::current().baggage().get("tenant").map(ToString::to_string);
            let _ = tx.send((get_baggage(&cx, "tenant"), current));
        });

        assert!(matches!(handle.join().await, TaskOutcome::Completed));
        let (passed, current) = rx.await.unwrap();
        assert_eq!(passed.as_deref(), Some("acme"));
        assert_eq!(current.as_deref(), Some("acme"));
    }

    #[tokio::test]
    async fn task_observes_cancellation() {
        let (supervisor, _, _) = supervisor();
        let token = CancellationToken::new();

        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        let handle = supervisor.spawn(&token, &Context::new(), |_, token| async move {
            let _ = started_tx.send(());
            token.cancelled().await;
        });

        started_rx.await.unwrap();
        token.cancel();

        assert!(matches!(handle.join().await, TaskOutcome::Completed));
    }

    #[tokio::test]
    async fn cancel_before_first_poll_skips_the_task() {
        let (supervisor, logger, monitor) = supervisor();
        let token = CancellationToken::new();

        // The current-thread runtime does not poll the task until join yields
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let handle = supervisor.spawn(&token, &Context::new(), move |_, _| async move {
            flag.store(true, Ordering::SeqCst);
        });
        assert!(handle.started());
        token.cancel();

        assert!(matches!(handle.join().await, TaskOutcome::Cancelled));
        assert!(!ran.load(Ordering::SeqCst));
        assert!(logger.entries().is_empty());
        assert!(monitor.counter_measurements(TASK_PANIC_COUNT).is_empty());
    }
}
