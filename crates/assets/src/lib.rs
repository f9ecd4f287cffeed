//! MeshPilot asset integrations — intent routing over the host's upstream
//! providers.
//!
//! Provider choice is a deterministic keyword heuristic ([`intent`]); each
//! provider flow runs behind its own circuit breaker; availability is read
//! from the host with a short TTL.

pub mod availability;
pub mod hyper3d;
pub mod intent;
pub mod polyhaven;
pub mod router;
pub mod sketchfab;

#[cfg(test)]
pub(crate) mod test_host;

pub use availability::{AvailabilityCache, AvailabilityMap};
pub use intent::{AssetIntent, AssetKind, AssetProvider, classify};
pub use router::{AssetRouter, ImportedAsset, RouteOutcome};
