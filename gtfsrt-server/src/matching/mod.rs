//! Resolution of realtime trips against the reference schedule.
//!
//! A trip's stored plan items describe when and where it runs; the
//! matcher turns the first and last of them into per-stop criteria and
//! asks the schedule store for the one trip instance satisfying all of
//! them. Resolution happens on the hot path of message handling, so a
//! semaphore bounds how many queries run at once.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::domain::TimetableStopId;
use crate::iris::IrisPlanItem;
use crate::schedule::{MatchOutcome, ScheduleError, ScheduleStore, StopTimeFilter, TripInstanceQuery};
use crate::stations::StationTable;

/// Route names a line may appear under in the schedule. Realtime
/// messages report the bare line (`44`), schedules often prefix the
/// category (`RB44` or `RB 44`).
pub fn route_name_variants(line: &str, category: Option<&str>) -> Vec<String> {
    let mut names = vec![line.to_string()];
    if let Some(category) = category.filter(|category| !category.is_empty()) {
        if !line.starts_with(category) {
            names.push(format!("{category}{line}"));
            names.push(format!("{category} {line}"));
        }
    }
    names
}

#[derive(Debug, Clone)]
pub struct MatcherConfig {
    /// Maximum number of schedule queries in flight at once.
    pub concurrency: usize,
}

impl MatcherConfig {
    pub fn new() -> Self {
        Self { concurrency: 8 }
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Matcher<S> {
    store: Arc<S>,
    stations: Arc<StationTable>,
    permits: Arc<Semaphore>,
}

impl<S: ScheduleStore> Matcher<S> {
    pub fn new(store: Arc<S>, stations: Arc<StationTable>, config: &MatcherConfig) -> Self {
        Self {
            store,
            stations,
            permits: Arc::new(Semaphore::new(config.concurrency.max(1))),
        }
    }

    /// Resolves the trip instance behind a set of plan items, which must
    /// belong to one trip and be ordered by stop sequence.
    pub async fn match_trip(&self, plans: &[IrisPlanItem]) -> Result<MatchOutcome, ScheduleError> {
        let Some(query) = self.build_query(plans) else {
            warn!("no plan item has a planned departure, cannot resolve the trip");
            return Ok(MatchOutcome::Unmatched);
        };
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ScheduleError::new("matcher semaphore closed"))?;
        let outcome = self.store.find_trip_instance(&query).await?;
        match &outcome {
            MatchOutcome::Matched(rows) => {
                if let Some(row) = rows.first() {
                    debug!(trip_id = %row.trip_id, date = %row.date, "resolved trip instance");
                }
            }
            MatchOutcome::Unmatched => warn!(
                service_date = %query.service_date,
                route_names = ?query.route_names,
                stops = query.stops.len(),
                "no schedule trip instance matches"
            ),
            MatchOutcome::Ambiguous { candidates } => warn!(
                candidates,
                service_date = %query.service_date,
                route_names = ?query.route_names,
                "schedule match is ambiguous, not publishing"
            ),
        }
        Ok(outcome)
    }

    /// Criteria come from the first and last plan item that have a
    /// planned departure; items without one cannot anchor a window and
    /// are skipped.
    fn build_query(&self, plans: &[IrisPlanItem]) -> Option<TripInstanceQuery> {
        let service_date = plans.first()?.service_date.date();
        let candidates: Vec<StopTimeFilter> = plans
            .iter()
            .filter_map(|item| self.stop_filter(item))
            .collect();
        let mut stops = vec![candidates.first()?.clone()];
        if candidates.len() > 1 {
            stops.push(candidates[candidates.len() - 1].clone());
        }
        let route_names = plans
            .iter()
            .find_map(|item| {
                let line = item.plan.line()?;
                if line.is_empty() {
                    return None;
                }
                Some(route_name_variants(line, item.plan.category()))
            })
            .unwrap_or_default();
        Some(TripInstanceQuery {
            service_date,
            route_names,
            stops,
        })
    }

    fn stop_filter(&self, item: &IrisPlanItem) -> Option<StopTimeFilter> {
        let departure = item.plan.departure.as_ref()?.planned_time?;
        let station = self.stations.get(item.stop_id);
        Some(StopTimeFilter {
            departure,
            stop_id: Some(item.stop_id.to_string()),
            stop_sequence: TimetableStopId::parse(&item.raw_id)
                .ok()
                .map(|id| id.stop_sequence()),
            normalized_stop_name: station.map(|station| station.normalized_name.clone()),
            coordinates: station.map(|station| station.coordinates()),
        })
    }
}
