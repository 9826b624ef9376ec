//! Background Tasks Module
//!
//! Optional periodic maintenance; lazy expiry keeps the cache correct
//! without it.

mod sweeper;

pub use sweeper::{spawn_sweeper, SweeperHandle};
