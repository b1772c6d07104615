//! Watch mode - runs a backup immediately, then on a fixed interval
//!
//! Runs never overlap: the next tick is only awaited once the previous run
//! has finished, and missed ticks are delayed rather than bunched up.

use crate::backup::{BackupEngine, RunReport};
use crate::Config;
use anyhow::{Context, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Counters over the lifetime of a watcher
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchStats {
    pub runs: u64,
    /// Runs in which at least one tree failed
    pub runs_with_failures: u64,
    pub commits: u64,
}

/// Periodic backup runner
pub struct Watcher {
    engine: BackupEngine,
    period: Duration,
    stats: WatchStats,
}

impl Watcher {
    pub fn new(config: Config) -> Result<Self> {
        let period = config
            .watch_interval()
            .context("Failed to parse watch interval")?;

        Ok(Self {
            engine: BackupEngine::new(config),
            period,
            stats: WatchStats::default(),
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn stats(&self) -> WatchStats {
        self.stats
    }

    /// Run until Ctrl+C
    pub async fn run(&mut self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            debug!("Ctrl+C received");
        })
        .await;
        Ok(())
    }

    /// Run until `shutdown` resolves. A run already in progress is finished
    /// before the shutdown is noticed.
    pub async fn run_until<F: Future<Output = ()>>(&mut self, shutdown: F) {
        let mut timer = interval(self.period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!("Watch loop started with interval: {:?}", self.period);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received, stopping watch loop");
                    break;
                }
                _ = timer.tick() => {
                    let report = self.engine.run().await;
                    self.record(&report);
                }
            }
        }

        info!(
            "Watch loop exiting after {} run(s), {} commit(s)",
            self.stats.runs, self.stats.commits
        );
    }

    fn record(&mut self, report: &RunReport) {
        self.stats.runs += 1;
        self.stats.commits += report.committed() as u64;
        if report.failed() > 0 {
            self.stats.runs_with_failures += 1;
            warn!(
                "Run {} finished with {} failed tree(s)",
                self.stats.runs,
                report.failed()
            );
        }
        debug!("Next run in {:?}", self.period);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_config(interval: &str) -> Config {
        let mut config = Config {
            archive: "/nonexistent/repoarchive/archive".to_string(),
            ..Default::default()
        };
        config.watch.interval = interval.to_string();
        config
    }

    #[test]
    fn test_watcher_rejects_bad_interval() {
        assert!(Watcher::new(empty_config("often")).is_err());
        assert!(Watcher::new(empty_config("0s")).is_err());
    }

    #[test]
    fn test_watcher_period() {
        let watcher = Watcher::new(empty_config("15m")).unwrap();
        assert_eq!(watcher.period(), Duration::from_secs(900));
        assert_eq!(watcher.stats(), WatchStats::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_run_is_immediate() {
        let mut watcher = Watcher::new(empty_config("1h")).unwrap();

        watcher
            .run_until(tokio::time::sleep(Duration::from_millis(200)))
            .await;

        let stats = watcher.stats();
        assert_eq!(stats.runs, 1);
        assert_eq!(stats.commits, 0);
        assert_eq!(stats.runs_with_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_repeat_on_interval() {
        let mut watcher = Watcher::new(empty_config("10s")).unwrap();

        watcher
            .run_until(tokio::time::sleep(Duration::from_secs(25)))
            .await;

        // t = 0, 10, 20
        assert_eq!(watcher.stats().runs, 3);
    }
}
