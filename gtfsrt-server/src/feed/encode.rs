//! Conversion of domain trip updates into the protobuf feed format.

use gtfs_realtime as pb;
use prost::Message;

use crate::domain::{
    StopScheduleRelationship, StopTimeEvent, StopTimeUpdate, TripDescriptor,
    TripScheduleRelationship, TripUpdate,
};

pub const GTFS_RT_VERSION: &str = "2.0";

fn to_event(event: &StopTimeEvent) -> pb::trip_update::StopTimeEvent {
    pb::trip_update::StopTimeEvent {
        time: event.time,
        delay: event.delay,
        ..Default::default()
    }
}

fn stop_schedule_relationship(relationship: StopScheduleRelationship) -> Option<i32> {
    use pb::trip_update::stop_time_update::ScheduleRelationship;
    match relationship {
        StopScheduleRelationship::Scheduled => Some(ScheduleRelationship::Scheduled as i32),
        StopScheduleRelationship::Skipped => Some(ScheduleRelationship::Skipped as i32),
        // The stop-level wire enum has no counterpart for an added stop.
        StopScheduleRelationship::Added => None,
    }
}

fn trip_schedule_relationship(relationship: TripScheduleRelationship) -> i32 {
    use pb::trip_descriptor::ScheduleRelationship;
    match relationship {
        TripScheduleRelationship::Scheduled => ScheduleRelationship::Scheduled as i32,
        TripScheduleRelationship::Added => ScheduleRelationship::Added as i32,
        TripScheduleRelationship::Canceled => ScheduleRelationship::Canceled as i32,
    }
}

fn to_stop_time_update(update: &StopTimeUpdate) -> pb::trip_update::StopTimeUpdate {
    pb::trip_update::StopTimeUpdate {
        stop_sequence: update.stop_sequence,
        stop_id: update.stop_id.clone(),
        arrival: update.arrival.as_ref().map(to_event),
        departure: update.departure.as_ref().map(to_event),
        schedule_relationship: update
            .schedule_relationship
            .and_then(stop_schedule_relationship),
        ..Default::default()
    }
}

fn to_trip_descriptor(trip: &TripDescriptor) -> pb::TripDescriptor {
    pb::TripDescriptor {
        trip_id: trip.trip_id.clone(),
        route_id: trip.route_id.clone(),
        direction_id: trip.direction_id,
        start_time: trip.start_time.clone(),
        start_date: trip.start_date.clone(),
        schedule_relationship: trip.schedule_relationship.map(trip_schedule_relationship),
        ..Default::default()
    }
}

fn to_feed_entity(id: &str, update: &TripUpdate) -> pb::FeedEntity {
    pb::FeedEntity {
        id: id.to_string(),
        trip_update: Some(pb::TripUpdate {
            trip: to_trip_descriptor(&update.trip),
            stop_time_update: update
                .stop_time_update
                .iter()
                .map(to_stop_time_update)
                .collect(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Builds the full-dataset feed message for the given entities.
pub fn build_feed_message(entities: &[(String, TripUpdate)], timestamp: u64) -> pb::FeedMessage {
    pb::FeedMessage {
        header: pb::FeedHeader {
            gtfs_realtime_version: GTFS_RT_VERSION.to_string(),
            incrementality: Some(pb::feed_header::Incrementality::FullDataset as i32),
            timestamp: Some(timestamp),
            ..Default::default()
        },
        entity: entities
            .iter()
            .map(|(id, update)| to_feed_entity(id, update))
            .collect(),
    }
}

/// Serializes a feed message into its wire bytes.
pub fn encode_feed_message(message: &pb::FeedMessage) -> Vec<u8> {
    message.encode_to_vec()
}
