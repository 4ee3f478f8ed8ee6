// Batch scheduler: runs one worker thread per song file under a
// concurrency bound.
//
// Architecture: a single polling loop on the calling thread owns all
// bookkeeping. Workers are plain `std::thread`s that return their result
// through their `JoinHandle`; the loop never blocks on any one of them.
// Each pass:
//
// 1. Reap finished workers (`JoinHandle::is_finished`), accumulating bytes,
//    chart counts, and failures. A worker that returns `Err` or panics is
//    logged and counted; its siblings are unaffected.
// 2. Admit pending units, largest first, until the bound is reached.
// 3. Log progress whenever the pending or in-flight count changed.
// 4. Sleep. The delay shrinks from `max_delay` toward `min_delay` with the
//    number of units admitted in this pass: a pass that started a full
//    `concurrency` worth of units comes back quickly, a pass that started
//    nothing waits the longest.
//
// Units are sorted by size before the run so the largest files start first
// and small files fill in the tail.

use crate::error::BatchError;
use std::collections::VecDeque;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{error, info};

/// One independently processable piece of work, typically a song file.
pub trait WorkUnit: Send + 'static {
    /// Size in bytes, used for ordering and progress.
    fn size(&self) -> u64;

    /// Name used in log lines.
    fn label(&self) -> String;

    /// Process the unit, returning the number of charts generated.
    fn run(self) -> Result<usize, BatchError>;
}

#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub concurrency: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            concurrency: num_cpus::get().max(1),
            min_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub units: usize,
    pub completed: usize,
    pub failed: usize,
    pub charts_generated: usize,
    pub total_bytes: u64,
    pub processed_bytes: u64,
    /// Highest number of workers running at once.
    pub max_in_flight: usize,
}

struct InFlight {
    label: String,
    size: u64,
    handle: JoinHandle<Result<usize, BatchError>>,
}

fn lerp(from: Duration, to: Duration, t: f64) -> Duration {
    let t = t.clamp(0.0, 1.0);
    let (a, b) = (from.as_secs_f64(), to.as_secs_f64());
    Duration::from_secs_f64(a + (b - a) * t)
}

/// Sleep after a pass that admitted `admitted` units.
fn pass_delay(config: &SchedulerConfig, concurrency: usize, admitted: usize) -> Duration {
    lerp(
        config.max_delay,
        config.min_delay,
        admitted as f64 / concurrency as f64,
    )
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        100.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

pub fn progress_line(summary: &BatchSummary) -> String {
    const MB: f64 = 1024.0 * 1024.0;
    let done = (summary.completed + summary.failed) as u64;
    format!(
        "Progress: {}/{} songs ({:.2}%). {:.2}/{:.2} MB ({:.2}%).",
        done,
        summary.units,
        percent(done, summary.units as u64),
        summary.processed_bytes as f64 / MB,
        summary.total_bytes as f64 / MB,
        percent(summary.processed_bytes, summary.total_bytes),
    )
}

/// Run every unit to completion and return the totals.
pub fn run_batch<U: WorkUnit>(mut units: Vec<U>, config: &SchedulerConfig) -> BatchSummary {
    let concurrency = config.concurrency.max(1);
    // Stable sort: equal sizes keep discovery order.
    units.sort_by_key(|u| std::cmp::Reverse(u.size()));

    let mut summary = BatchSummary {
        units: units.len(),
        total_bytes: units.iter().map(|u| u.size()).sum(),
        ..BatchSummary::default()
    };
    let mut pending: VecDeque<U> = units.into();
    let mut in_flight: Vec<InFlight> = Vec::with_capacity(concurrency);
    let mut started = 0usize;
    let mut last_reported: Option<(usize, usize)> = None;

    loop {
        let mut i = 0;
        while i < in_flight.len() {
            if !in_flight[i].handle.is_finished() {
                i += 1;
                continue;
            }
            let done = in_flight.swap_remove(i);
            summary.processed_bytes += done.size;
            match done.handle.join() {
                Ok(Ok(charts)) => {
                    summary.completed += 1;
                    summary.charts_generated += charts;
                }
                Ok(Err(e)) => {
                    error!("{}: {e}", done.label);
                    summary.failed += 1;
                }
                Err(_) => {
                    error!("{}: worker panicked", done.label);
                    summary.failed += 1;
                }
            }
        }

        let mut admitted = 0usize;
        while in_flight.len() < concurrency {
            let Some(unit) = pending.pop_front() else {
                break;
            };
            let label = unit.label();
            let size = unit.size();
            started += 1;
            admitted += 1;
            match thread::Builder::new()
                .name(format!("song-{started}"))
                .spawn(move || unit.run())
            {
                Ok(handle) => in_flight.push(InFlight {
                    label,
                    size,
                    handle,
                }),
                Err(e) => {
                    error!("{label}: failed to start worker: {e}");
                    summary.failed += 1;
                    summary.processed_bytes += size;
                }
            }
        }
        summary.max_in_flight = summary.max_in_flight.max(in_flight.len());

        let state = (pending.len(), in_flight.len());
        if last_reported != Some(state) {
            info!("{}", progress_line(&summary));
            last_reported = Some(state);
        }
        if pending.is_empty() && in_flight.is_empty() {
            break;
        }

        thread::sleep(pass_delay(config, concurrency, admitted));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TestUnit {
        size: u64,
        charts: usize,
        fail: bool,
        panic: bool,
        running: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        order: Arc<Mutex<Vec<u64>>>,
    }

    impl WorkUnit for TestUnit {
        fn size(&self) -> u64 {
            self.size
        }

        fn label(&self) -> String {
            format!("unit-{}", self.size)
        }

        fn run(self) -> Result<usize, BatchError> {
            self.order.lock().unwrap().push(self.size);
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(15));
            self.running.fetch_sub(1, Ordering::SeqCst);
            if self.panic {
                panic!("unit panic");
            }
            if self.fail {
                return Err(ConfigError::Invalid("unit failure".to_string()).into());
            }
            Ok(self.charts)
        }
    }

    fn fast() -> SchedulerConfig {
        SchedulerConfig {
            concurrency: 2,
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    fn test_units(specs: &[(u64, bool, bool)]) -> (Vec<TestUnit>, Arc<AtomicUsize>, Arc<Mutex<Vec<u64>>>) {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));
        let units = specs
            .iter()
            .map(|&(size, fail, panic)| TestUnit {
                size,
                charts: 2,
                fail,
                panic,
                running: running.clone(),
                peak: peak.clone(),
                order: order.clone(),
            })
            .collect();
        (units, peak, order)
    }

    #[test]
    fn respects_the_concurrency_bound_and_terminates() {
        let specs: Vec<_> = (1..=7).map(|s| (s * 100, false, false)).collect();
        let (units, peak, order) = test_units(&specs);
        let summary = run_batch(units, &fast());
        assert_eq!(summary.units, 7);
        assert_eq!(summary.completed, 7);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.charts_generated, 14);
        assert_eq!(summary.processed_bytes, summary.total_bytes);
        assert!(summary.max_in_flight <= 2);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        // The two largest units are admitted first.
        let order = order.lock().unwrap();
        let mut first_two = order[..2].to_vec();
        first_two.sort();
        assert_eq!(first_two, vec![600, 700]);
    }

    #[test]
    fn failures_and_panics_do_not_stop_siblings() {
        let (units, _, _) = test_units(&[(10, false, false), (20, true, false), (30, false, true)]);
        let summary = run_batch(units, &fast());
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.charts_generated, 2);
    }

    #[test]
    fn empty_batch_finishes_immediately() {
        let summary = run_batch(Vec::<TestUnit>::new(), &fast());
        assert_eq!(summary, BatchSummary::default());
    }

    #[test]
    fn delay_ramps_from_max_to_min() {
        let (max, min) = (Duration::from_millis(100), Duration::from_millis(10));
        let close = |a: Duration, b: Duration| a.abs_diff(b) < Duration::from_micros(1);
        assert!(close(lerp(max, min, 0.0), max));
        assert!(close(lerp(max, min, 1.0), min));
        assert!(close(lerp(max, min, 4.0), min));
        assert!(close(lerp(max, min, 0.5), Duration::from_millis(55)));
    }

    #[test]
    fn idle_passes_wait_the_longest() {
        let config = SchedulerConfig {
            concurrency: 4,
            min_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
        };
        let close = |a: Duration, b: Duration| a.abs_diff(b) < Duration::from_micros(1);
        assert!(close(pass_delay(&config, 4, 0), config.max_delay));
        assert!(close(pass_delay(&config, 4, 2), Duration::from_millis(55)));
        assert!(close(pass_delay(&config, 4, 4), config.min_delay));
    }

    #[test]
    fn waiting_on_a_worker_sleeps_the_max_delay() {
        // One slot: after the first admission, the next pass admits nothing
        // while the worker runs.
        let config = SchedulerConfig {
            concurrency: 1,
            min_delay: Duration::ZERO,
            max_delay: Duration::from_millis(120),
        };
        let (units, _, _) = test_units(&[(10, false, false), (20, false, false)]);
        let start = std::time::Instant::now();
        let summary = run_batch(units, &config);
        assert_eq!(summary.completed, 2);
        assert!(start.elapsed() >= config.max_delay, "{:?}", start.elapsed());
    }

    #[test]
    fn progress_line_format() {
        let summary = BatchSummary {
            units: 4,
            completed: 1,
            failed: 1,
            total_bytes: 4 * 1024 * 1024,
            processed_bytes: 1024 * 1024,
            ..BatchSummary::default()
        };
        assert_eq!(
            progress_line(&summary),
            "Progress: 2/4 songs (50.00%). 1.00/4.00 MB (25.00%)."
        );
    }
}
