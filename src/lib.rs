pub mod camera;
pub mod geometry;
pub mod system;
pub mod taxa;
pub mod tracking;

#[cfg(test)]
pub(crate) mod test_support;

pub use taxa::{CameraTrackedTaxon, TaxonId};
pub use tracking::{CameraTaxonTracker, TaxonEvent, TrackerConfig};
