//! `AirPlay` protocol setup
//!
//! Wires the stream session, feature registry and remote control bridge of
//! one device together and hands them out as [`SetupData`] items.

pub mod pairing;
mod setup;

#[cfg(test)]
mod tests;

pub use crate::interface::{PendingTasks, ProtocolHandler, SetupData};
pub use setup::{
    AirPlayProtocol, AirPlayProtocolBuilder, AirPlaySetup, ClientSessionManager,
    SecondaryProtocolFactory,
};
