//! Run the KZ2 algorithm on synthetic stereo frames with known disparities.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use gc_disparity::kz2::{DataCost, Kz2, Matcher, Params};
use gc_disparity::prelude::*;
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};

// -----------------------------------------------------------------------------------------------
// HELPERS
// -----------------------------------------------------------------------------------------------

fn gray_frame(
    width: u32,
    left_height: u32,
    right_height: u32,
    left: impl Fn(u32, u32) -> u8,
    right: impl Fn(u32, u32) -> u8
) -> StereoFrame {
    StereoFrame::new(
        DynamicImage::ImageLuma8(GrayImage::from_fn(width, left_height, |x, y| Luma([left(x, y)]))),
        DynamicImage::ImageLuma8(GrayImage::from_fn(width, right_height, |x, y| Luma([right(x, y)])))
    )
}

/// Left ramp with steps of 15, the right image is the same ramp shifted two pixels left.
fn ramp_frame() -> StereoFrame {
    gray_frame(12, 3, 3, |x, _| (10 + 15 * x) as u8, |x, _| (10 + 15 * (x + 2)) as u8)
}

fn ramp_params() -> Params {
    Params {
        min_disparity: -3,
        max_disparity: 0,
        data_cost: DataCost::L2,
        occlusion_cost: Some(30.0),
        lambda: Some(10.0),
        ..Params::default()
    }
}

/// Pseudo-random texture, a function of the coordinates only.
fn texture(x: u32, y: u32) -> u8 {
    let mut h = x.wrapping_mul(374_761_393) ^ y.wrapping_mul(668_265_263);
    h = (h ^ (h >> 13)).wrapping_mul(1_274_126_177);
    (h >> 24) as u8
}

/// Every active assignment is recorded consistently in both disparity maps.
fn assert_consistent(left: &DisparityMap, right: &DisparityMap) {
    for y in 0..left.height().min(right.height()) {
        for x in 0..left.width() {
            let d = left.get(x, y);
            if d != OCCLUDED {
                let q = (x as i32 + d) as usize;
                assert_eq!(right.get(q, y), -d, "left ({}, {}) -> right {}", x, y, q);
            }
        }
        for x in 0..right.width() {
            let d = right.get(x, y);
            if d != OCCLUDED {
                let p = (x as i32 + d) as usize;
                assert_eq!(left.get(p, y), -d, "right ({}, {}) -> left {}", x, y, p);
            }
        }
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[test]
fn identical_rows_match_at_zero() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let values = [10u8, 50, 90, 130];
    let frame = gray_frame(4, 1, 1, |x, _| values[x as usize], |x, _| values[x as usize]);

    let params = Params {
        min_disparity: 0,
        max_disparity: 0,
        occlusion_cost: Some(5.0),
        lambda: Some(1.0),
        ..Params::default()
    };

    let mut matcher = Matcher::new(&frame, false)?;
    matcher.set_disparity_range(0, 0)?;
    let weights = matcher.resolve_weights(&params)?;
    matcher.set_weights(weights)?;

    let convergence = matcher.run()?;
    let map = matcher.disparity_map();

    assert!(map.as_slice().iter().all(|&d| d == 0));
    // no data cost, only the occlusion cost saved on each of the 4 pixels
    assert_eq!(convergence.energy, -4 * 5);
    assert_eq!(convergence.history, vec![0, -20]);
    assert!(convergence.converged);
    assert_eq!(convergence.iterations, 1);

    Ok(())
}

#[test]
fn shifted_ramp_is_recovered() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let frame = ramp_frame();

    let mut matcher = Matcher::new(&frame, false)?;
    matcher.set_disparity_range(-3, 0)?;
    let weights = matcher.resolve_weights(&ramp_params())?;
    assert_eq!(weights.occlusion_cost, 30);
    assert_eq!(weights.lambda1, 30);
    assert_eq!(weights.lambda2, 10);
    matcher.set_weights(weights)?;

    let convergence = matcher.run()?;
    let left = matcher.disparity_map();
    let right = matcher.right_disparity_map();

    for y in 0..3 {
        assert!(left.is_occluded(0, y));
        assert!(left.is_occluded(1, y));
        for x in 2..12 {
            assert_eq!(left.get(x, y), -2, "pixel ({}, {})", x, y);
        }
        for x in 0..10 {
            assert_eq!(right.get(x, y), 2);
        }
        assert!(right.is_occluded(10, y));
        assert!(right.is_occluded(11, y));
    }

    assert_eq!(convergence.energy, -30 * 10 * 3);
    assert_eq!(matcher.compute_energy()?, convergence.energy);
    assert_consistent(&left, &right);

    Ok(())
}

#[test]
fn color_frames_match_like_gray() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let ramp = |x: u32| (10 + 15 * x) as u8;
    let frame = StereoFrame::new(
        DynamicImage::ImageRgb8(RgbImage::from_fn(12, 3, |x, _| {
            let v = ramp(x);
            Rgb([v, v, v])
        })),
        DynamicImage::ImageRgb8(RgbImage::from_fn(12, 3, |x, _| {
            let v = ramp(x + 2);
            Rgb([v, v, v])
        }))
    );

    let mut kz2 = Kz2::new(Params {
        color: true,
        ..ramp_params()
    });
    let map = kz2.compute(&frame)?;

    assert_eq!(map.get(5, 1), -2);
    assert!(map.is_occluded(0, 0));
    assert_eq!(kz2.convergence().map(|c| c.energy), Some(-900));

    Ok(())
}

#[test]
fn energy_decreases_on_every_accepted_move() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let frame = gray_frame(16, 8, 8, texture, |x, y| texture(x + 2, y));

    let params = Params {
        min_disparity: -3,
        max_disparity: 0,
        max_iterations: 3,
        randomize: true,
        seed: 7,
        ..Params::default()
    };

    let mut matcher = Matcher::new(&frame, false)?;
    matcher.set_disparity_range(params.min_disparity, params.max_disparity)?;
    let weights = matcher.resolve_weights(&params)?;
    matcher.set_weights(weights)?;

    let convergence = matcher.run()?;

    assert!(convergence.history.windows(2).all(|w| w[1] < w[0]));
    assert_eq!(convergence.history.len(), convergence.accepted_moves as usize + 1);
    assert!(convergence.accepted_moves >= 1);
    assert!(convergence.accepted_moves <= 3 * 4);
    assert!(convergence.iterations <= 3);
    assert_eq!(matcher.compute_energy()?, convergence.energy);
    assert_consistent(&matcher.disparity_map(), &matcher.right_disparity_map());

    Ok(())
}

#[test]
fn runs_are_reproducible_for_a_seed() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let frame = gray_frame(16, 6, 6, texture, |x, y| texture(x + 1, y));
    let params = Params {
        min_disparity: -2,
        max_disparity: 0,
        randomize: true,
        seed: 42,
        ..Params::default()
    };

    let first = Kz2::new(params.clone()).compute(&frame)?;
    let second = Kz2::new(params).compute(&frame)?;
    assert_eq!(first, second);

    Ok(())
}

#[test]
fn extra_left_rows_are_occluded() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let frame = gray_frame(12, 4, 3, |x, _| (10 + 15 * x) as u8, |x, _| (10 + 15 * (x + 2)) as u8);

    let map = Kz2::new(ramp_params()).compute(&frame)?;

    assert_eq!(map.height(), 4);
    assert_eq!(map.get(6, 2), -2);
    assert!((0..12).all(|x| map.is_occluded(x, 3)));
    assert_eq!(map.min_disp, Some(-3));
    assert_eq!(map.max_disp, Some(0));

    Ok(())
}

#[test]
fn invalid_range_fails_before_matching() {
    let frame = ramp_frame();
    let mut kz2 = Kz2::new(Params {
        min_disparity: 1,
        max_disparity: -1,
        ..Params::default()
    });

    match kz2.compute(&frame) {
        Err(Error::InvalidDisparityRange { min: 1, max: -1 }) => {}
        other => panic!("unexpected result: {:?}", other.map(|m| m.width()))
    }
    assert!(kz2.convergence().is_none());
}

#[test]
fn flat_images_cannot_estimate_occlusion_cost() {
    let frame = gray_frame(8, 2, 2, |_, _| 128, |_, _| 128);
    let mut kz2 = Kz2::new(Params {
        min_disparity: -2,
        max_disparity: 0,
        ..Params::default()
    });

    assert!(matches!(kz2.compute(&frame), Err(Error::ZeroNoiseEstimate)));
}

#[test]
fn empty_frames_are_rejected() {
    let frame = gray_frame(0, 0, 0, |_, _| 0, |_, _| 0);
    assert!(matches!(Matcher::new(&frame, false), Err(Error::EmptyImage)));
}
