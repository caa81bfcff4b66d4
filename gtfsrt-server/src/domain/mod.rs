//! Core data shapes shared across the pipeline.

pub mod eva;
pub mod stop_id;
pub mod time;
pub mod trip_update;

pub use eva::{EvaNumber, InvalidEvaNumber};
pub use stop_id::{
    InvalidStopId, PartialStopId, TimetableStopId, compare_by_sequence, trip_instance_range,
};
pub use time::{DB_TIMEZONE, ServiceDate, format_iris_datetime, parse_iris_datetime};
pub use trip_update::{
    StopScheduleRelationship, StopTimeEvent, StopTimeUpdate, TripDescriptor,
    TripScheduleRelationship, TripUpdate,
};
