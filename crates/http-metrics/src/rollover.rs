//! Local-midnight rollover of the daily and monthly counters.

use chrono::{DateTime, Datelike, Local, LocalResult, NaiveDate, TimeZone};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::collector::MetricsCollector;
use crate::labels::CounterKind;

/// Source of wall-clock time for the scheduler.
pub trait Clock: Send + Sync + 'static {
    type Tz: TimeZone + Send + Sync;

    fn now(&self) -> DateTime<Self::Tz>;
}

/// The host's local time zone.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    type Tz = Local;

    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Start of the next calendar day in `now`'s time zone. A midnight swallowed
/// by a DST gap resolves to the first valid instant after it.
pub fn next_midnight<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Tz> {
    let fallback = || now.clone() + chrono::Duration::days(1);
    let Some(mut candidate) = now
        .date_naive()
        .succ_opt()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
    else {
        return fallback();
    };
    let tz = now.timezone();
    for _ in 0..8 {
        match tz.from_local_datetime(&candidate) {
            LocalResult::Single(at) => return at,
            LocalResult::Ambiguous(earliest, _) => return earliest,
            LocalResult::None => candidate += chrono::Duration::minutes(15),
        }
    }
    fallback()
}

struct Plan {
    date: NaiveDate,
    wait: Duration,
}

impl Plan {
    fn from_now<Tz: TimeZone>(now: &DateTime<Tz>) -> Self {
        let target = next_midnight(now);
        let date = target.date_naive();
        let wait = target
            .signed_duration_since(now.clone())
            .to_std()
            .unwrap_or(Duration::ZERO);
        Self { date, wait }
    }
}

/// Which counters to reset when a new day starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rollover {
    pub date: NaiveDate,
    pub daily: bool,
    pub monthly: bool,
}

impl Rollover {
    /// Rollover on reaching `date`: daily always, monthly only on the 1st.
    pub fn for_date(date: NaiveDate) -> Self {
        Self {
            date,
            daily: true,
            monthly: date.day() == 1,
        }
    }

    pub fn apply(&self, collector: &dyn MetricsCollector) {
        if self.daily {
            collector.reset(CounterKind::Daily);
        }
        if self.monthly {
            collector.reset(CounterKind::Monthly);
        }
        info!(
            date = %self.date,
            daily = self.daily,
            monthly = self.monthly,
            "reset counters"
        );
    }
}

pub struct RolloverScheduler;

impl RolloverScheduler {
    /// Starts the rollover loop on the current runtime.
    pub fn spawn<C: Clock>(collector: Arc<dyn MetricsCollector>, clock: C) -> RolloverHandle {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(collector, clock, cancel.clone()));
        RolloverHandle { cancel, task }
    }
}

async fn run<C: Clock>(collector: Arc<dyn MetricsCollector>, clock: C, cancel: CancellationToken) {
    loop {
        let plan = Plan::from_now(&clock.now());
        info!(wait = ?plan.wait, next = %plan.date, "sleeping until counter rollover");
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("counter rollover stopped");
                return;
            }
            _ = tokio::time::sleep(plan.wait) => {}
        }

        let today = clock.now().date_naive();
        if today < plan.date {
            continue;
        }
        Rollover::for_date(today).apply(collector.as_ref());
    }
}

/// Owner of a running scheduler.
pub struct RolloverHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl RolloverHandle {
    /// Stops the loop and waits for it to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(err) = self.task.await {
            warn!(%err, "counter rollover task ended abnormally");
        }
    }
}
