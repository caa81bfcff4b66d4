//! Realtime timetable reconciliation server.
//!
//! Consumes plan and change messages from a dispatch-system stream,
//! matches each trip against a reference schedule and publishes the
//! merged result as a GTFS-RT TripUpdate feed, written to disk and
//! served over HTTP.

pub mod assemble;
pub mod domain;
pub mod feed;
pub mod iris;
pub mod kv;
pub mod matching;
pub mod merge;
pub mod pipeline;
pub mod schedule;
pub mod stations;
pub mod stream;
pub mod web;
