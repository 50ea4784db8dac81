#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Temporal alignment of district estimates.
//!
//! Grid snapshots arrive at irregular valid times. Everything downstream
//! works on a fixed canonical cadence: [`Cadence::normalize`] snaps a
//! timestamp to it, [`CanonicalSeries`] holds one value per canonical
//! timestamp, and [`Resolver`] derives the current value, trailing means
//! and forecast lookups that feed the alert payload. [`history`] adds
//! calendar-period medians for charting.

pub mod cadence;
pub mod history;
pub mod resolve;
pub mod series;

pub use cadence::Cadence;
pub use resolve::{Resolver, alert_basis, rolling_mean};
pub use series::CanonicalSeries;

use chrono::{DateTime, Utc};

/// Errors from temporal resolution.
#[derive(Debug, thiserror::Error)]
pub enum TemporalError {
    /// The configured cadence does not divide the day.
    #[error("Cadence of {hours}h does not divide 24 hours")]
    InvalidCadence {
        /// Offending cadence.
        hours: u32,
    },

    /// Nothing in the series can stand in for the reference time.
    #[error("No suitable data at or before {reference}")]
    NoSuitableData {
        /// Normalized reference time.
        reference: DateTime<Utc>,
    },
}
