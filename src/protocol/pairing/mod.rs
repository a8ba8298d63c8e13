//! Credentials and pairing
//!
//! The pair-setup algorithm itself is provided by a [`PairSetupProcedure`];
//! this module drives it and turns its outcome into stored credentials.

mod credentials;
mod handler;


pub use credentials::{AuthenticationType, HapCredentials, extract_credentials, parse_credentials};
pub use handler::{AirPlayPairingHandler, PairOptions, PairSetupProcedure};
