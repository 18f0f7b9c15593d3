//! Tracked objects: surface samples, the taxon entity, outlier filtering,
//! the collision/merge test and the handle-based registry.

pub mod collision;
pub mod outliers;
pub mod registry;
pub mod sample;
pub mod taxon;
pub mod types;

pub use collision::{Survivor, choose_survivor, collides, merge_into};
pub use outliers::{RansacParams, filter_outliers_once, filter_outliers_repeated};
pub use registry::TaxonRegistry;
pub use sample::{ImageSampleContext, SharedImage, TrackSample};
pub use taxon::{CameraTrackedTaxon, RemovalReason, TaxonConfig};
pub use types::TaxonId;
