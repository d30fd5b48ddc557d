//! Common types and shared functionality
//!
//! This module contains the domain types used across the raffle service.

pub mod types;

pub use types::*;
