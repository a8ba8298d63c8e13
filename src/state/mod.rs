//! Device state notifications

mod events;

pub use events::{DeviceEvent, StateProducer};
