//! Closing overdue contribution cycles.
//!
//! Members who did not contribute before a group's `nextContribution` date are marked as
//! having missed the cycle. Nothing does this on a request path; the sweeper binary runs
//! [`AppServices::run_sweep`] on a fixed interval.

use std::io;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use ajo_infra::workers::{SweepWorker, WorkerHandle};

use crate::error::{ServiceError, ServiceResult};
use crate::services::AppServices;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    /// Cycles closed, across all groups.
    pub closed: u32,
    /// Groups skipped because a close was rejected.
    pub failed: u32,
}

impl AppServices {
    /// Close every contribution cycle whose deadline is at or before `now`.
    ///
    /// A group several cycles behind is closed once per missed cycle.
    pub fn run_sweep(&self, now: DateTime<Utc>) -> ServiceResult<SweepReport> {
        let mut report = SweepReport::default();

        for group_id in self.overdue_groups(now) {
            loop {
                match self.close_cycle(group_id, now) {
                    Ok(group) => {
                        report.closed += 1;
                        if !group.is_cycle_due(now) {
                            break;
                        }
                    }
                    Err(ServiceError::Domain(err)) => {
                        warn!(group_id = %group_id, error = %err, kind = err.kind(), "cycle close rejected");
                        report.failed += 1;
                        break;
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        if report.closed > 0 || report.failed > 0 {
            info!(closed = report.closed, failed = report.failed, "sweep finished");
        }
        Ok(report)
    }

    /// Run the sweep every `sweep_interval` on a background thread.
    pub fn spawn_sweeper(self: &Arc<Self>) -> io::Result<WorkerHandle> {
        let services = Arc::clone(self);
        SweepWorker::spawn("ajo-sweeper", self.config().sweep_interval(), move || {
            services.run_sweep(Utc::now()).map(|_| ())
        })
    }
}
