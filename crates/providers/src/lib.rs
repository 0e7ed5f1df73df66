//! Upstream providers for toolrelay.
//!
//! All providers implement the `toolrelay_core::Provider` trait. The driver
//! table decides which upstream driver serves a given model.

pub mod driver_call;
pub mod router;

pub use driver_call::DriverCallProvider;
pub use router::{DriverTable, owned_by};
