//! Ingestion of the realtime message feed: payload shapes, the decode
//! boundary, item retention and fixture replay.

pub mod decode;
pub mod replay;
pub mod store;
pub mod types;

pub use decode::{DecodeError, decode_change_entry, decode_plan_entry};
pub use replay::{ReplayError, load_change_entries, load_plan_entries};
pub use store::{RealtimeItemStore, RealtimeItemStoreConfig, StoreError};
pub use types::{
    IrisChangeItem, IrisChangePayload, IrisPlanItem, IrisPlanPayload, IrisStopEvent, IrisTripLabel,
};
