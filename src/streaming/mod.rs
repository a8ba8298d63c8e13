//! URL streaming

mod player;
mod server;
mod session;


pub use player::MediaPlayer;
pub use server::{ContentServer, ContentServerFactory, StaticFileServer, StaticFileServerFactory};
pub use session::{AirPlayStream, StreamState};
