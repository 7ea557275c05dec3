//! Analytics events: the wire model, the pause-aware FIFO queue, and the fire-and-forget
//! dispatcher that feeds the ingestion endpoint.
mod dispatcher;
mod event;
mod queue;

pub use event::{
    CompanyIdentify, Event, EventBody, EventType, IdentifyBody, TrackBody, TraitValue, Traits,
};

pub(crate) use dispatcher::EventDispatcher;
