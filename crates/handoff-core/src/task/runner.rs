//! Worker threads driving one [`AudioTask`] each

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::utils::Backoff;

use super::{AudioTask, StepOutcome, StopToken, TaskError, TaskKind, TaskResult};
use crate::barrier::SpinBarrier;

/// Sleep once spinning and yielding stopped paying off
const IDLE_SLEEP: Duration = Duration::from_micros(200);

/// What a worker did over its lifetime
#[derive(Debug, Clone, PartialEq)]
pub struct TaskReport {
    pub name: String,
    pub kind: TaskKind,
    /// Calls to [`AudioTask::step`]
    pub steps: u64,
    pub processed: u64,
    pub idle: u64,
    /// Processed steps slower than the packet they handled
    pub deadline_misses: u64,
    pub max_step: Duration,
    /// Error that ended the task early
    pub error: Option<TaskError>,
}

impl TaskReport {
    fn new(name: &str, kind: TaskKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            steps: 0,
            processed: 0,
            idle: 0,
            deadline_misses: 0,
            max_step: Duration::ZERO,
            error: None,
        }
    }
}

/// Handle to a running worker
pub struct TaskHandle {
    name: String,
    stop: StopToken,
    thread_handle: Option<JoinHandle<TaskReport>>,
}

impl TaskHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask the worker to leave its loop after the current step
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Check if the worker is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Wait for the worker and collect its report
    pub fn join(mut self) -> TaskResult<TaskReport> {
        let handle = self
            .thread_handle
            .take()
            .ok_or_else(|| TaskError::Panicked(self.name.clone()))?;
        handle
            .join()
            .map_err(|_| TaskError::Panicked(self.name.clone()))
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Run `task` on its own named thread until it finishes, fails or `stop` is set
///
/// With a `start_gate` the worker spins at the rendezvous before its first
/// step, so a group of workers can be released together.
pub fn spawn_task<T>(
    task: T,
    stop: StopToken,
    start_gate: Option<Arc<SpinBarrier>>,
) -> TaskResult<TaskHandle>
where
    T: AudioTask + 'static,
{
    let name = task.name().to_string();
    let worker_stop = stop.clone();

    let thread_handle = thread::Builder::new()
        .name(format!("handoff-{}", name))
        .spawn(move || run(task, worker_stop, start_gate))
        .map_err(|e| TaskError::Spawn {
            name: name.clone(),
            reason: e.to_string(),
        })?;

    Ok(TaskHandle {
        name,
        stop,
        thread_handle: Some(thread_handle),
    })
}

fn run<T: AudioTask>(mut task: T, stop: StopToken, start_gate: Option<Arc<SpinBarrier>>) -> TaskReport {
    let mut report = TaskReport::new(task.name(), task.kind());

    if let Some(gate) = start_gate {
        gate.wait();
    }
    if let Err(e) = task.start() {
        log::error!("Task '{}' failed to start: {}", report.name, e);
        report.error = Some(e);
        task.stop();
        return report;
    }
    log::debug!("Task '{}' running", report.name);

    let backoff = Backoff::new();
    while !stop.is_stopped() {
        let began = Instant::now();
        let outcome = task.step();
        let elapsed = began.elapsed();
        report.steps += 1;

        match outcome {
            Ok(StepOutcome::Processed) => {
                report.processed += 1;
                report.max_step = report.max_step.max(elapsed);
                if task.packet_budget().is_some_and(|budget| elapsed > budget) {
                    report.deadline_misses += 1;
                }
                backoff.reset();
            }
            Ok(StepOutcome::Idle) => {
                report.idle += 1;
                if backoff.is_completed() {
                    thread::sleep(IDLE_SLEEP);
                } else {
                    backoff.snooze();
                }
            }
            Ok(StepOutcome::Finished) => break,
            Err(e) => {
                log::error!("Task '{}' failed: {}", report.name, e);
                report.error = Some(e);
                break;
            }
        }
    }

    task.stop();
    log::info!(
        "Task '{}' stopped: {} packets, {} deadline misses, slowest step {:?}",
        report.name,
        report.processed,
        report.deadline_misses,
        report.max_step
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Processes `remaining` packets then finishes
    struct Countdown {
        remaining: u32,
        idle_every: u32,
        tick: u32,
    }

    impl AudioTask for Countdown {
        fn name(&self) -> &str {
            "countdown"
        }

        fn kind(&self) -> TaskKind {
            TaskKind::Filter
        }

        fn step(&mut self) -> TaskResult<StepOutcome> {
            self.tick += 1;
            if self.remaining == 0 {
                return Ok(StepOutcome::Finished);
            }
            if self.idle_every > 0 && self.tick % self.idle_every == 0 {
                return Ok(StepOutcome::Idle);
            }
            self.remaining -= 1;
            Ok(StepOutcome::Processed)
        }
    }

    /// Every step overruns a 1ns budget
    struct Slow;

    impl AudioTask for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        fn kind(&self) -> TaskKind {
            TaskKind::Playback
        }

        fn step(&mut self) -> TaskResult<StepOutcome> {
            thread::sleep(Duration::from_millis(1));
            Ok(StepOutcome::Processed)
        }

        fn packet_budget(&self) -> Option<Duration> {
            Some(Duration::from_nanos(1))
        }
    }

    struct Failing;

    impl AudioTask for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn kind(&self) -> TaskKind {
            TaskKind::Capture
        }

        fn step(&mut self) -> TaskResult<StepOutcome> {
            Err(TaskError::Source {
                name: "failing".into(),
                reason: "unplugged".into(),
            })
        }
    }

    #[test]
    fn test_runs_until_finished() {
        let task = Countdown {
            remaining: 10,
            idle_every: 3,
            tick: 0,
        };
        let report = spawn_task(task, StopToken::new(), None)
            .unwrap()
            .join()
            .unwrap();

        assert_eq!(report.name, "countdown");
        assert_eq!(report.processed, 10);
        assert_eq!(report.idle, 4);
        assert_eq!(report.steps, 15);
        assert!(report.error.is_none());
    }

    #[test]
    fn test_counts_deadline_misses() {
        let handle = spawn_task(Slow, StopToken::new(), None).unwrap();
        thread::sleep(Duration::from_millis(20));
        handle.stop();
        let report = handle.join().unwrap();

        assert!(report.processed > 0);
        assert_eq!(report.deadline_misses, report.processed);
        assert!(report.max_step >= Duration::from_millis(1));
    }

    #[test]
    fn test_error_ends_task() {
        let report = spawn_task(Failing, StopToken::new(), None)
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(report.steps, 1);
        assert!(matches!(report.error, Some(TaskError::Source { .. })));
    }

    #[test]
    fn test_start_gate_holds_worker() {
        let gate = Arc::new(SpinBarrier::new(2));
        let task = Countdown {
            remaining: 1,
            idle_every: 0,
            tick: 0,
        };
        let handle = spawn_task(task, StopToken::new(), Some(Arc::clone(&gate))).unwrap();

        thread::sleep(Duration::from_millis(10));
        assert!(handle.is_running());
        gate.wait();
        let report = handle.join().unwrap();
        assert_eq!(report.processed, 1);
    }

    #[test]
    fn test_stop_token_ends_idle_task() {
        let task = Countdown {
            remaining: u32::MAX,
            idle_every: 1,
            tick: 0,
        };
        let stop = StopToken::new();
        let handle = spawn_task(task, stop.clone(), None).unwrap();
        thread::sleep(Duration::from_millis(5));
        stop.stop();

        let report = handle.join().unwrap();
        assert_eq!(report.processed, 0);
        assert!(report.idle > 0);
    }
}
