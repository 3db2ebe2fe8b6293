pub mod cancel;
pub mod channel;
pub mod config;
pub mod controller;
pub mod delivery;
pub mod error;
pub mod message;
pub mod network;
pub mod node;
pub mod prompt;
pub mod ring;
pub mod util_types;
