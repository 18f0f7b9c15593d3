//! Geometry utilities: camera poses, rays, angles.

pub mod pose;

pub use pose::{CameraPose, Ray, angle_degrees, rotate_about};
