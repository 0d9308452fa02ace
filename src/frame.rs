//! # Stereo frames
//!
//! A rectified pair of images, the input to every disparity algorithm in this crate.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use std::path::Path;

use image::{DynamicImage, GenericImageView};

use crate::error::*;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// A rectified stereo pair.
///
/// Rows of the left and right images are assumed to be epipolar lines. The images may differ in
/// width and height, algorithms only use the rows both images share.
pub struct StereoFrame {
    pub left: DynamicImage,
    pub right: DynamicImage
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl StereoFrame {
    pub fn new(left: DynamicImage, right: DynamicImage) -> Self {
        Self { left, right }
    }

    /// Load a frame from a pair of image files.
    pub fn open<P: AsRef<Path>, Q: AsRef<Path>>(left: P, right: Q) -> Result<Self> {
        Ok(Self {
            left: image::open(left)?,
            right: image::open(right)?
        })
    }

    /// Width of the left image.
    pub fn width(&self) -> u32 {
        self.left.width()
    }

    /// Number of rows shared by both images.
    pub fn height(&self) -> u32 {
        self.left.height().min(self.right.height())
    }
}
