//! # Disparity Computation
//!
//! This crate provides dense disparity map computation for stereo computer vision, by energy
//! minimization with graph cuts.
//!
//! The layers, from the bottom up:
//!
//! - [`graph`]: min-cut/max-flow on a network with two implicit terminals,
//! - [`energy`]: minimization of regular energies of binary variables through a min-cut,
//! - [`kz2`]: the Kolmogorov-Zabih stereo algorithm, alpha-expansion over disparities.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

mod disparity;
mod error;
mod frame;
pub mod energy;
pub mod graph;
pub mod kz2;

// -----------------------------------------------------------------------------------------------
// EXPORTS
// -----------------------------------------------------------------------------------------------

pub use error::{Error, Result};

pub mod prelude {
    pub use crate::disparity::{DisparityAlgorithm, DisparityMap, FloatDisparityImage, OCCLUDED};
    pub use crate::error::{Error, Result};
    pub use crate::frame::StereoFrame;
}
