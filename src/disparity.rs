//! # General disparity objects
//!
//! This module provides generic disparity traits and structures for use by different algorithms.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use std::path::Path;

use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};

use crate::error::*;
use crate::frame::StereoFrame;

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

/// Disparity value of a pixel with no correspondent in the other image.
pub const OCCLUDED: i32 = i32::MAX;

/// Colour used for occluded pixels in scaled renderings.
const OCCLUDED_RGB: Rgb<u8> = Rgb([0, 255, 255]);

/// Darkest gray level used in scaled renderings.
const SCALED_FLOOR: i32 = 64;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// A dense integer disparity map, indexed by left image pixel.
///
/// A pixel at `(x, y)` holding disparity `d` matches the right image pixel `(x + d, y)`.
#[derive(Clone, Debug, PartialEq)]
pub struct DisparityMap {
    width: usize,
    height: usize,
    data: Vec<i32>,
    pub max_disp: Option<i32>,
    pub min_disp: Option<i32>
}

/// A floating point disparity image, occluded pixels hold NaN.
pub type FloatDisparityImage = ImageBuffer<Luma<f32>, Vec<f32>>;

// -----------------------------------------------------------------------------------------------
// TRAITS
// -----------------------------------------------------------------------------------------------

pub trait DisparityAlgorithm {
    /// Compute the disparity map of the given stereo frame.
    fn compute(&mut self, frame: &StereoFrame) -> Result<DisparityMap>;
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl DisparityMap {
    /// Create a map of the given size with every pixel occluded.
    pub fn new(width: usize, height: usize) -> Self {
        DisparityMap {
            width,
            height,
            data: vec![OCCLUDED; width * height],
            min_disp: None,
            max_disp: None
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, x: usize, y: usize) -> i32 {
        self.data[y * self.width + x]
    }

    pub fn put(&mut self, x: usize, y: usize, val: i32) {
        self.data[y * self.width + x] = val;
    }

    pub fn is_occluded(&self, x: usize, y: usize) -> bool {
        self.get(x, y) == OCCLUDED
    }

    /// Row-major view of the raw values.
    pub fn as_slice(&self) -> &[i32] {
        &self.data
    }

    /// Converts the map into a float image, occluded pixels become NaN.
    pub fn to_float_image(&self) -> FloatDisparityImage {
        ImageBuffer::from_fn(self.width as u32, self.height as u32, |x, y| {
            match self.get(x as usize, y as usize) {
                OCCLUDED => Luma([std::f32::NAN]),
                d => Luma([d as f32])
            }
        })
    }

    /// Converts the map into an unscaled GrayImage.
    ///
    /// Disparities are clamped to `0..=255`, occluded pixels are black.
    pub fn to_luma(&self) -> GrayImage {
        let mut new = GrayImage::new(self.width as u32, self.height as u32);

        for y in 0..self.height {
            for x in 0..self.width {
                let val = match self.get(x, y) {
                    OCCLUDED => 0,
                    d => d.max(0).min(255)
                };

                new.put_pixel(x as u32, y as u32, Luma([val as u8]));
            }
        }

        new
    }

    /// Converts the map into a scaled RGB image.
    ///
    /// Disparities are mapped to gray levels between 64 and 255 over the disparity range. If
    /// `low_is_dark` is set the lowest disparity is the darkest, otherwise it is the brightest.
    /// Occluded pixels are cyan. When the range is not set the observed range is used.
    pub fn to_rgb_scaled(&self, low_is_dark: bool) -> RgbImage {
        let (min, max) = self.range();
        let size = max - min + 1;

        let mut new = RgbImage::new(self.width as u32, self.height as u32);

        for y in 0..self.height {
            for x in 0..self.width {
                let pixel = match self.get(x, y) {
                    OCCLUDED => OCCLUDED_RGB,
                    d => {
                        let c = if size <= 0 {
                            255
                        }
                        else if low_is_dark {
                            255 - (255 - SCALED_FLOOR) * (max - d) / size
                        }
                        else {
                            255 - (255 - SCALED_FLOOR) * (d - min) / size
                        };
                        let c = c.max(0).min(255) as u8;
                        Rgb([c, c, c])
                    }
                };

                new.put_pixel(x as u32, y as u32, pixel);
            }
        }

        new
    }

    /// Save the scaled RGB rendering of the map, the format is chosen from the extension.
    pub fn save_scaled<P: AsRef<Path>>(&self, path: P, low_is_dark: bool) -> Result<()> {
        self.to_rgb_scaled(low_is_dark).save(path)?;
        Ok(())
    }

    /// Save the map as a single precision OpenEXR file, occluded pixels hold NaN.
    ///
    /// The disparity is written to the R, G and B channels alike.
    pub fn save_float<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let img = self.to_float_image();

        exr::prelude::write_rgb_file(path, self.width, self.height, |x, y| {
            let d = img.get_pixel(x as u32, y as u32)[0];
            (d, d, d)
        })?;

        Ok(())
    }

    /// Disparity range, either as set by the algorithm or as observed in the map.
    fn range(&self) -> (i32, i32) {
        if let (Some(min), Some(max)) = (self.min_disp, self.max_disp) {
            return (min, max);
        }

        self.data
            .iter()
            .filter(|&&d| d != OCCLUDED)
            .fold(None, |acc, &d| match acc {
                None => Some((d, d)),
                Some((min, max)) => Some((min.min(d), max.max(d)))
            })
            .unwrap_or((0, 0))
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
