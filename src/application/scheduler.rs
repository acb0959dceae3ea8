use super::batch::Batch;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Semaphore;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{info, warn};

const SECOND: Duration = Duration::from_secs(1);

/// Timing budget of one burst second.
///
/// Runs wait for the `lead` window before a wall-clock second, or take the next
/// boundary when they begin inside it. Every batch is due on a second
/// boundary and counts as late once `dispatch_window` has passed; its starts are spread
/// by `spacing`, shrunk so the batch fits in one second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingBudget {
    pub lead: Duration,
    pub dispatch_window: Duration,
    pub spacing: Duration,
}

impl TimingBudget {
    pub fn new(spacing: Duration) -> Self {
        Self {
            lead: Duration::from_millis(200),
            dispatch_window: Duration::from_millis(50),
            spacing,
        }
    }

    /// Time to wait, given the current sub-second offset, until the lead window opens.
    /// Inside the window already, there is nothing to wait for.
    pub fn delay_until_lead(&self, subsec: Duration) -> Duration {
        SECOND.saturating_sub(self.lead).saturating_sub(subsec)
    }

    /// Time from `subsec` (after the lead delay) to the next second boundary.
    pub fn until_boundary(&self, subsec: Duration) -> Duration {
        let aligned = subsec + self.delay_until_lead(subsec);
        SECOND.saturating_sub(aligned)
    }

    /// Spacing for `tps` starts, shrunk so the last one lands a dispatch window before the next second.
    pub fn spacing_for(&self, tps: u32) -> Duration {
        if tps == 0 {
            return self.spacing;
        }
        let fits = SECOND.saturating_sub(self.dispatch_window) / tps;
        self.spacing.min(fits)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BurstReport {
    pub dispatched: u64,
    pub accepted: u64,
    pub elapsed: Duration,
    /// `dispatched / elapsed`; observational only.
    pub mean_tps: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalReport {
    pub batches: u64,
    pub dispatched: u64,
    pub accepted: u64,
    pub elapsed: Duration,
}

/// Offset of the wall clock into the current second.
pub fn wall_clock_subsec() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|since| Duration::from_nanos(u64::from(since.subsec_nanos())))
        .unwrap_or_default()
}

/// Paces repeated request batches against the target.
#[derive(Clone)]
pub struct LoadScheduler {
    budget: TimingBudget,
    in_flight: Option<Arc<Semaphore>>,
    clock: fn() -> Duration,
}

impl LoadScheduler {
    pub fn new(budget: TimingBudget, max_in_flight: Option<usize>) -> Self {
        Self {
            budget,
            in_flight: max_in_flight.map(|permits| Arc::new(Semaphore::new(permits.max(1)))),
            clock: wall_clock_subsec,
        }
    }

    /// Same ceiling, different spacing.
    pub fn with_spacing(&self, spacing: Duration) -> Self {
        Self {
            budget: TimingBudget {
                spacing,
                ..self.budget
            },
            ..self.clone()
        }
    }

    /// Replaces the wall-clock source used for alignment.
    pub fn with_clock(mut self, clock: fn() -> Duration) -> Self {
        self.clock = clock;
        self
    }

    pub fn budget(&self) -> TimingBudget {
        self.budget
    }

    /// Fires `tps` shots per second for `duration`, then joins every shot.
    ///
    /// `shot` receives the running shot number and reports whether the target accepted it.
    /// Late seconds are logged and the run carries on.
    pub async fn run_burst<F, Fut>(
        &self,
        label: &str,
        tps: u32,
        duration: Duration,
        shot: F,
    ) -> BurstReport
    where
        F: Fn(u64) -> Fut,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let seconds = duration.as_secs();
        let spacing = self.budget.spacing_for(tps);
        info!(
            "Burst [{label}]: {tps} TPS for {seconds}s, expecting {} requests",
            u64::from(tps) * seconds
        );

        let subsec = (self.clock)();
        time::sleep(self.budget.delay_until_lead(subsec)).await;
        let started = Instant::now() + self.budget.until_boundary(subsec);
        let mut batch = Batch::new();
        let mut fired = 0u64;

        for second in 0..seconds {
            let deadline = started + SECOND * second as u32;
            let now = Instant::now();
            if now > deadline + self.budget.dispatch_window {
                warn!(
                    "Burst [{label}] second {second} started {:?} late",
                    now - deadline
                );
            }
            for i in 0..tps {
                time::sleep_until(deadline + spacing * i).await;
                fired += 1;
                self.spawn(&mut batch, format!("{label}#{fired}"), shot(fired))
                    .await;
            }
        }
        if seconds > 0 {
            time::sleep_until(started + SECOND * seconds as u32).await;
        }

        let dispatched = batch.len() as u64;
        let accepted = count_accepted(batch.join().await);
        let elapsed = Instant::now() - started;
        let mean_tps = if elapsed.is_zero() {
            0.0
        } else {
            dispatched as f64 / elapsed.as_secs_f64()
        };
        info!(
            "Burst [{label}] finished: {dispatched} sent, {accepted} accepted in {:.2}s ({mean_tps:.2} TPS)",
            elapsed.as_secs_f64()
        );
        BurstReport {
            dispatched,
            accepted,
            elapsed,
            mean_tps,
        }
    }

    /// Every `interval`, fires one shot per entry of `plan` and joins them, until
    /// `shutdown` resolves. A batch in progress always completes.
    pub async fn run_interval<F, Fut, S>(
        &self,
        plan: &[String],
        interval: Duration,
        shot: F,
        shutdown: S,
    ) -> IntervalReport
    where
        F: Fn(&str) -> Fut,
        Fut: Future<Output = bool> + Send + 'static,
        S: Future<Output = ()>,
    {
        let started = Instant::now();
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut report = IntervalReport {
            batches: 0,
            dispatched: 0,
            accepted: 0,
            elapsed: Duration::ZERO,
        };
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Soak stopped after {} batches", report.batches);
                    break;
                }
                _ = ticker.tick() => {
                    let mut batch = Batch::new();
                    for (i, flow) in plan.iter().enumerate() {
                        self.spawn(&mut batch, format!("{flow}#{i}"), shot(flow)).await;
                    }
                    report.batches += 1;
                    report.dispatched += batch.len() as u64;
                    let accepted = count_accepted(batch.join().await);
                    report.accepted += accepted;
                    info!(
                        "Soak batch {}: {accepted}/{} accepted",
                        report.batches,
                        plan.len()
                    );
                }
            }
        }
        report.elapsed = Instant::now() - started;
        report
    }

    async fn spawn<Fut>(&self, batch: &mut Batch<bool>, name: String, shot: Fut)
    where
        Fut: Future<Output = bool> + Send + 'static,
    {
        let permit = match &self.in_flight {
            Some(semaphore) => semaphore.clone().acquire_owned().await.ok(),
            None => None,
        };
        batch.spawn(name, async move {
            let accepted = shot.await;
            drop(permit);
            Ok(accepted)
        });
    }
}

fn count_accepted(outcomes: Vec<(String, crate::error::Result<bool>)>) -> u64 {
    outcomes
        .into_iter()
        .filter(|(_, outcome)| matches!(outcome, Ok(true)))
        .count() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn on_the_second() -> Duration {
        Duration::ZERO
    }

    fn scheduler() -> LoadScheduler {
        LoadScheduler::new(TimingBudget::new(Duration::from_millis(20)), None)
            .with_clock(on_the_second)
    }

    #[test]
    fn test_delay_until_lead() {
        let budget = TimingBudget::new(Duration::from_millis(20));
        assert_eq!(budget.delay_until_lead(Duration::ZERO), Duration::from_millis(800));
        assert_eq!(budget.delay_until_lead(Duration::from_millis(800)), Duration::ZERO);
        assert_eq!(budget.delay_until_lead(Duration::from_millis(900)), Duration::ZERO);

        assert_eq!(budget.until_boundary(Duration::ZERO), Duration::from_millis(200));
        assert_eq!(budget.until_boundary(Duration::from_millis(300)), Duration::from_millis(200));
        assert_eq!(budget.until_boundary(Duration::from_millis(850)), Duration::from_millis(150));
    }

    #[test]
    fn test_spacing_fits_inside_the_second() {
        let budget = TimingBudget::new(Duration::from_millis(20));
        assert_eq!(budget.spacing_for(5), Duration::from_millis(20));
        assert_eq!(budget.spacing_for(100), Duration::from_micros(9500));
        assert_eq!(budget.spacing_for(0), Duration::from_millis(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_fires_exact_count_in_one_second_windows() {
        let fired_at = Arc::new(Mutex::new(Vec::new()));
        let log = fired_at.clone();

        let report = scheduler()
            .run_burst("sgp_irct_dmct", 5, Duration::from_secs(60), move |n| {
                log.lock().unwrap().push((n, Instant::now()));
                async { true }
            })
            .await;

        assert_eq!(report.dispatched, 300);
        assert_eq!(report.accepted, 300);
        assert_eq!(report.elapsed, Duration::from_secs(60));
        assert!((report.mean_tps - 5.0).abs() < 1e-9);

        let fired_at = fired_at.lock().unwrap();
        assert_eq!(fired_at.len(), 300);
        let first = fired_at[0].1;
        for batch in fired_at.chunks(5) {
            let opened = batch[0].1 - first;
            let closed = batch[4].1 - first;
            assert_eq!(opened.subsec_nanos(), 0);
            assert!(closed - opened < SECOND);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_counts_rejections_and_keeps_going() {
        let report = scheduler()
            .run_burst("x", 4, Duration::from_secs(3), |n| async move { n % 2 == 0 })
            .await;
        assert_eq!(report.dispatched, 12);
        assert_eq!(report.accepted, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_aligns_to_lead_window() {
        fn mid_second() -> Duration {
            Duration::from_millis(300)
        }
        let first = Arc::new(Mutex::new(None));
        let seen = first.clone();
        let begin = Instant::now();

        scheduler()
            .with_clock(mid_second)
            .run_burst("x", 1, Duration::from_secs(1), move |_| {
                seen.lock().unwrap().get_or_insert(Instant::now());
                async { true }
            })
            .await;

        let first = first.lock().unwrap().unwrap();
        assert_eq!(first - begin, Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_inside_lead_window_starts_at_next_second() {
        fn late_in_second() -> Duration {
            Duration::from_millis(850)
        }
        let first = Arc::new(Mutex::new(None));
        let seen = first.clone();
        let begin = Instant::now();

        let report = scheduler()
            .with_clock(late_in_second)
            .run_burst("x", 1, Duration::from_secs(1), move |_| {
                seen.lock().unwrap().get_or_insert(Instant::now());
                async { true }
            })
            .await;

        let first = first.lock().unwrap().unwrap();
        assert_eq!(first - begin, Duration::from_millis(150));
        assert_eq!(report.elapsed, SECOND);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_ceiling_bounds_concurrency() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let scheduler = LoadScheduler::new(TimingBudget::new(Duration::from_millis(1)), Some(2))
            .with_clock(on_the_second);

        let (a, p) = (active.clone(), peak.clone());
        let report = scheduler
            .run_burst("x", 10, Duration::from_secs(1), move |_| {
                let (active, peak) = (a.clone(), p.clone());
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    time::sleep(Duration::from_millis(30)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    true
                }
            })
            .await;

        assert_eq!(report.dispatched, 10);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_soak_runs_until_shutdown() {
        let plan: Vec<String> = ["a", "a", "b", "b"].map(String::from).to_vec();
        let counts = Arc::new(Mutex::new(Vec::new()));
        let log = counts.clone();

        let report = scheduler()
            .run_interval(
                &plan,
                Duration::from_secs(60),
                move |flow| {
                    log.lock().unwrap().push(flow.to_string());
                    async { true }
                },
                time::sleep(Duration::from_secs(150)),
            )
            .await;

        assert_eq!(report.batches, 3);
        assert_eq!(report.dispatched, 12);
        assert_eq!(report.accepted, 12);
        let counts = counts.lock().unwrap();
        assert_eq!(counts.iter().filter(|f| *f == "a").count(), 6);
        assert_eq!(counts.iter().filter(|f| *f == "b").count(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_soak_finishes_batch_in_progress() {
        let plan = vec!["slow".to_string()];
        let report = scheduler()
            .run_interval(
                &plan,
                Duration::from_secs(60),
                |_| async {
                    time::sleep(Duration::from_secs(10)).await;
                    true
                },
                time::sleep(Duration::from_secs(5)),
            )
            .await;

        assert_eq!(report.batches, 1);
        assert_eq!(report.accepted, 1);
    }
}
