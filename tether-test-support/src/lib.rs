//! Test utilities for tether sessions.
//!
//! - [`mock`]: in-memory transport that records everything the session does
//! - [`clock`]: clock advanced by hand
//! - [`frames`]: builders for server frames
//! - [`chaos`]: garbling of text frames
//! - [`verify`]: delivery counting for callbacks and handlers

pub mod chaos;
pub mod clock;
pub mod frames;
pub mod mock;
pub mod verify;

pub use chaos::FrameChaos;
pub use clock::ManualClock;
pub use mock::MockTransport;
pub use verify::DeliveryLog;
