//! Domain entities extracted from a decoded feed.
//!
//! Extraction is pure: a fresh `Vec` is built on every cycle and replaces the
//! previous one wholesale in the store. Nothing here is ever mutated after
//! construction.

use serde::Serialize;

use crate::gtfs_rt::{self, FeedMessage};

/// How a trip relates to its schedule right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TripDisposition {
    Scheduled,
    Added,
    Unscheduled,
    Canceled,
}

impl TripDisposition {
    fn from_descriptor(trip: &gtfs_rt::TripDescriptor) -> Self {
        use gtfs_rt::trip_descriptor::ScheduleRelationship as S;
        match trip.schedule_relationship() {
            S::Scheduled => TripDisposition::Scheduled,
            S::Added | S::Duplicated => TripDisposition::Added,
            S::Unscheduled => TripDisposition::Unscheduled,
            S::Canceled | S::Deleted => TripDisposition::Canceled,
        }
    }
}

/// Per-trip delay and cancellation status.
#[derive(Debug, Clone, Serialize)]
pub struct TripStatus {
    pub trip_id: String,
    pub route_id: Option<String>,
    pub disposition: TripDisposition,
    /// Seconds behind schedule; negative means early.
    pub delay_secs: Option<i32>,
    pub vehicle: Option<String>,
    pub updated_at: Option<u64>,
}

impl TripStatus {
    /// Builds the trip list from a decoded feed.
    ///
    /// Trip updates are the primary source. A vehicle position that carries a
    /// trip descriptor but no matching trip update still yields an entry, so
    /// vehicle-only feeds produce a usable board.
    pub fn from_feed(feed: &FeedMessage) -> Vec<TripStatus> {
        feed.entity
            .iter()
            .filter_map(|entity| {
                if let Some(update) = &entity.trip_update {
                    Some(TripStatus {
                        trip_id: trip_id_or(&update.trip, &entity.id),
                        route_id: update.trip.route_id.clone(),
                        disposition: TripDisposition::from_descriptor(&update.trip),
                        delay_secs: trip_delay(update),
                        vehicle: update.vehicle.as_ref().and_then(|v| v.id.clone()),
                        updated_at: update.timestamp,
                    })
                } else if let Some(vehicle) = &entity.vehicle {
                    let trip = vehicle.trip.as_ref()?;
                    Some(TripStatus {
                        trip_id: trip_id_or(trip, &entity.id),
                        route_id: trip.route_id.clone(),
                        disposition: TripDisposition::from_descriptor(trip),
                        delay_secs: None,
                        vehicle: vehicle.vehicle.as_ref().and_then(|v| v.id.clone()),
                        updated_at: vehicle.timestamp,
                    })
                } else {
                    None
                }
            })
            .collect()
    }
}

fn trip_id_or(trip: &gtfs_rt::TripDescriptor, entity_id: &str) -> String {
    if trip.trip_id().is_empty() {
        entity_id.to_string()
    } else {
        trip.trip_id().to_string()
    }
}

/// Overall delay for a trip: the top-level delay when present, otherwise the
/// first stop-time event that reports one.
fn trip_delay(update: &gtfs_rt::TripUpdate) -> Option<i32> {
    if update.delay.is_some() {
        return update.delay;
    }
    update.stop_time_update.iter().find_map(|stu| {
        stu.arrival
            .as_ref()
            .and_then(|ev| ev.delay)
            .or_else(|| stu.departure.as_ref().and_then(|ev| ev.delay))
    })
}

/// One validity window of an alert, epoch seconds. Open ends are `None`.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveWindow {
    pub start: Option<u64>,
    pub end: Option<u64>,
}

/// An entity an alert applies to.
#[derive(Debug, Clone, Serialize)]
pub struct AffectedEntity {
    pub agency_id: Option<String>,
    pub route_id: Option<String>,
    pub stop_id: Option<String>,
    pub trip_id: Option<String>,
}

/// A service alert from the alerts feed. Superseded wholesale each cycle.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceAlert {
    pub id: String,
    pub active_windows: Vec<ActiveWindow>,
    pub affected: Vec<AffectedEntity>,
    pub cause: String,
    pub effect: String,
    pub header: String,
    pub description: String,
    pub url: Option<String>,
}

impl ServiceAlert {
    pub fn from_feed(feed: &FeedMessage) -> Vec<ServiceAlert> {
        feed.entity
            .iter()
            .filter_map(|entity| {
                let alert = entity.alert.as_ref()?;
                Some(ServiceAlert {
                    id: entity.id.clone(),
                    active_windows: alert
                        .active_period
                        .iter()
                        .map(|range| ActiveWindow {
                            start: range.start,
                            end: range.end,
                        })
                        .collect(),
                    affected: alert
                        .informed_entity
                        .iter()
                        .map(|sel| AffectedEntity {
                            agency_id: sel.agency_id.clone(),
                            route_id: sel.route_id.clone(),
                            stop_id: sel.stop_id.clone(),
                            trip_id: sel.trip.as_ref().and_then(|t| t.trip_id.clone()),
                        })
                        .collect(),
                    cause: alert.cause().as_str_name().to_string(),
                    effect: alert.effect().as_str_name().to_string(),
                    header: first_translation(alert.header_text.as_ref()),
                    description: first_translation(alert.description_text.as_ref()),
                    url: alert
                        .url
                        .as_ref()
                        .map(|t| first_translation(Some(t)))
                        .filter(|s| !s.is_empty()),
                })
            })
            .collect()
    }
}

fn first_translation(text: Option<&gtfs_rt::TranslatedString>) -> String {
    text.and_then(|t| t.translation.first())
        .map(|t| t.text.clone())
        .unwrap_or_default()
}
