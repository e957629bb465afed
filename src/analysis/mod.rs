//! Data organization utilities for the history view.
//!
//! Listing and filtering only: the service does no statistics over stored
//! readings.
//!
//! Submodules:
//! - `groupings`: distinct water sources and the client-side source filter.

pub mod groupings;
