//! # Pixel penalties
//!
//! Birchfield-Tomasi data cost and the intensity gradient used to pick the smoothness penalty.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use image::{ImageBuffer, Pixel};

use super::params::DataCost;

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

/// Upper bound on the intensity difference entering the data cost.
const CUTOFF: i32 = 30;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// Pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Coord {
    pub x: i32,
    pub y: i32
}

/// An 8-bit image along with, for every pixel and channel, the range of intensities reachable by
/// linear interpolation half way to its 4-neighbours.
pub(crate) struct IntervalImage {
    width: i32,
    height: i32,
    channels: usize,
    value: Vec<u8>,
    min: Vec<u8>,
    max: Vec<u8>
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl Coord {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The same row, `d` columns further. Saturates, so that far shifts stay out of any image.
    pub fn shift(self, d: i32) -> Self {
        Self { x: self.x.saturating_add(d), y: self.y }
    }
}

impl IntervalImage {
    /// Build from the first `height` rows of `image`.
    pub fn new<P>(image: &ImageBuffer<P, Vec<u8>>, height: u32) -> Self
    where
        P: Pixel<Subpixel = u8> + 'static
    {
        let width = image.width() as usize;
        let height = height.min(image.height()) as usize;
        let channels = P::CHANNEL_COUNT as usize;

        let value = image.as_raw()[..width * height * channels].to_vec();
        let mut min = value.clone();
        let mut max = value.clone();

        for y in 0..height {
            for x in 0..width {
                for c in 0..channels {
                    let at = |x: usize, y: usize| i32::from(value[(y * width + x) * channels + c]);
                    let i = at(x, y);

                    let mut neighbours = [i; 4];
                    if x > 0 {
                        neighbours[0] = (at(x - 1, y) + i) / 2;
                    }
                    if x + 1 < width {
                        neighbours[1] = (at(x + 1, y) + i) / 2;
                    }
                    if y > 0 {
                        neighbours[2] = (at(x, y - 1) + i) / 2;
                    }
                    if y + 1 < height {
                        neighbours[3] = (at(x, y + 1) + i) / 2;
                    }

                    let offset = (y * width + x) * channels + c;
                    min[offset] = neighbours.iter().fold(i, |m, &n| m.min(n)) as u8;
                    max[offset] = neighbours.iter().fold(i, |m, &n| m.max(n)) as u8;
                }
            }
        }

        Self {
            width: width as i32,
            height: height as i32,
            channels,
            value,
            min,
            max
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn contains(&self, p: Coord) -> bool {
        p.x >= 0 && p.x < self.width && p.y >= 0 && p.y < self.height
    }

    fn offset(&self, p: Coord) -> usize {
        (p.y * self.width + p.x) as usize * self.channels
    }

    fn value(&self, p: Coord, c: usize) -> i32 {
        i32::from(self.value[self.offset(p) + c])
    }

    fn interval(&self, p: Coord, c: usize) -> (i32, i32) {
        let offset = self.offset(p) + c;
        (i32::from(self.min[offset]), i32::from(self.max[offset]))
    }
}

/// Distance from `v` to the interval `[min, max]`.
fn dist_interval(v: i32, (min, max): (i32, i32)) -> i32 {
    if v < min {
        min - v
    }
    else if v > max {
        v - max
    }
    else {
        0
    }
}

/// Birchfield-Tomasi dissimilarity between left pixel `p` and right pixel `q`, averaged over
/// channels.
pub(crate) fn data_penalty(
    left: &IntervalImage,
    right: &IntervalImage,
    p: Coord,
    q: Coord,
    cost: DataCost
) -> i32 {
    let mut sum = 0;

    for c in 0..left.channels {
        let dp = dist_interval(left.value(p, c), right.interval(q, c));
        let dq = dist_interval(right.value(q, c), left.interval(p, c));
        let d = dp.min(dq).min(CUTOFF);

        sum += match cost {
            DataCost::L1 => d,
            DataCost::L2 => d * d
        };
    }

    sum / left.channels as i32
}

/// Largest absolute intensity step between neighbours `p1` and `p2`, in the left image and in the
/// right image at disparity `d`.
pub(crate) fn max_gradient(
    left: &IntervalImage,
    right: &IntervalImage,
    p1: Coord,
    p2: Coord,
    d: i32
) -> i32 {
    let (q1, q2) = (p1.shift(d), p2.shift(d));

    (0..left.channels)
        .map(|c| {
            let dl = (left.value(p1, c) - left.value(p2, c)).abs();
            let dr = (right.value(q1, c) - right.value(q2, c)).abs();
            dl.max(dr)
        })
        .max()
        .unwrap_or(0)
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, RgbImage, Rgb};

    fn row(values: &[u8]) -> IntervalImage {
        let img = GrayImage::from_fn(values.len() as u32, 1, |x, _| Luma([values[x as usize]]));
        IntervalImage::new(&img, 1)
    }

    #[test]
    fn intervals_reach_half_way_to_neighbours() {
        let img = row(&[10, 20, 60]);
        assert_eq!(img.interval(Coord::new(0, 0), 0), (10, 15));
        assert_eq!(img.interval(Coord::new(1, 0), 0), (15, 40));
        assert_eq!(img.interval(Coord::new(2, 0), 0), (40, 60));
    }

    #[test]
    fn height_is_cropped() {
        let img = GrayImage::from_fn(2, 3, |x, y| Luma([(x + 10 * y) as u8]));
        let img = IntervalImage::new(&img, 2);
        assert_eq!(img.height(), 2);
        assert!(img.contains(Coord::new(1, 1)));
        assert!(!img.contains(Coord::new(1, 2)));
        assert!(!img.contains(Coord::new(-1, 0)));
    }

    #[test]
    fn far_shifts_stay_outside() {
        let img = row(&[1, 2, 3]);
        let p = Coord::new(2, 0);

        assert_eq!(p.shift(-1), Coord::new(1, 0));
        assert_eq!(p.shift(i32::MAX), Coord::new(i32::MAX, 0));
        assert_eq!(Coord::new(-3, 0).shift(i32::MIN), Coord::new(i32::MIN, 0));
        assert!(!img.contains(p.shift(i32::MAX - 1)));
    }

    #[test]
    fn data_penalty_uses_interval_distance() {
        let left = row(&[10, 20, 60]);
        let right = row(&[100, 22, 30]);

        // 20 is 2 away from [22, 61], but 22 lies in [15, 40]
        assert_eq!(data_penalty(&left, &right, Coord::new(1, 0), Coord::new(1, 0), DataCost::L1), 0);

        // 10 vs [61, 100] is 51, 100 vs [10, 15] is 85, clamped to 30
        assert_eq!(data_penalty(&left, &right, Coord::new(0, 0), Coord::new(0, 0), DataCost::L1), 30);
        assert_eq!(data_penalty(&left, &right, Coord::new(0, 0), Coord::new(0, 0), DataCost::L2), 900);
    }

    #[test]
    fn color_penalty_averages_channels() {
        let left = RgbImage::from_fn(1, 1, |_, _| Rgb([10, 10, 10]));
        let right = RgbImage::from_fn(1, 1, |_, _| Rgb([13, 10, 16]));
        let left = IntervalImage::new(&left, 1);
        let right = IntervalImage::new(&right, 1);

        let p = Coord::new(0, 0);
        assert_eq!(data_penalty(&left, &right, p, p, DataCost::L1), (3 + 0 + 6) / 3);
        assert_eq!(data_penalty(&left, &right, p, p, DataCost::L2), (9 + 0 + 36) / 3);
    }

    #[test]
    fn gradient_takes_largest_step() {
        let left = row(&[10, 14, 50]);
        let right = row(&[0, 30, 31, 90]);

        assert_eq!(max_gradient(&left, &right, Coord::new(0, 0), Coord::new(1, 0), 1), 4);
        assert_eq!(max_gradient(&left, &right, Coord::new(1, 0), Coord::new(2, 0), 0), 36);
        assert_eq!(max_gradient(&left, &right, Coord::new(1, 0), Coord::new(2, 0), 1), 59);
    }
}
