//! # Error standards
//!
//! This module provides a standardised error enum and result type for this crate.

// -----------------------------------------------------------------------------------------------
// TYPES
// -----------------------------------------------------------------------------------------------

/// Standard result type used in the disparity crate.
pub type Result<T> = std::result::Result<T, Error>;

// -----------------------------------------------------------------------------------------------
// ENUMERATIONS
// -----------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid disparity range {min}..={max}: empty, too wide or reaching the occlusion marker")]
    InvalidDisparityRange {
        min: i32,
        max: i32
    },

    #[error("Invalid value for parameter {name}: {value}")]
    InvalidParameter {
        name: &'static str,
        value: f32
    },

    #[error("Not enough samples to estimate the occlusion cost")]
    NotEnoughSamples,

    #[error("Occlusion cost estimate is zero")]
    ZeroNoiseEstimate,

    #[error("Weights must be set before running the matcher")]
    WeightsNotSet,

    #[error("Stereo frame contains an empty image")]
    EmptyImage,

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("OpenEXR error: {0}")]
    Exr(#[from] exr::error::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not parse parameters: {0}")]
    Config(#[from] toml::de::Error)
}
