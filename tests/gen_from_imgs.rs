//! # Generate from images
//!
//! Writes a synthetic stereo pair and a parameter file to disk, computes the disparity map from
//! them and saves its scaled rendering.

use std::path::PathBuf;

use gc_disparity::{prelude::*, kz2::{Kz2, Params}};
use image::{GrayImage, Luma, Rgb};

const WIDTH: u32 = 24;
const HEIGHT: u32 = 6;

fn scratch_dir(name: &str) -> std::io::Result<PathBuf> {
    let dir = std::env::temp_dir().join(format!("gc-disparity-{}-{}", name, std::process::id()));
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn intensity(x: u32, y: u32) -> u8 {
    ((x * 29 + y * 7) % 160 + 40) as u8
}

#[test]
fn gen_from_imgs() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let dir = scratch_dir("gen")?;

    // Write the images, the right one sees every pixel 3 columns further left
    let left_path = dir.join("left.png");
    let right_path = dir.join("right.png");
    GrayImage::from_fn(WIDTH, HEIGHT, |x, y| Luma([intensity(x, y)])).save(&left_path)?;
    GrayImage::from_fn(WIDTH, HEIGHT, |x, y| Luma([intensity(x + 3, y)])).save(&right_path)?;

    let params_path = dir.join("params.toml");
    std::fs::write(
        &params_path,
        "min_disparity = -4\nmax_disparity = 0\ndata_cost = \"l1\"\nseed = 3\n"
    )?;

    let frame = StereoFrame::open(&left_path, &right_path)?;
    let params = Params::from_file(&params_path)?;
    assert_eq!(params.min_disparity, -4);

    let mut disp = Kz2::new(params);
    let map = disp.compute(&frame)?;

    assert_eq!((map.width(), map.height()), (WIDTH as usize, HEIGHT as usize));
    assert!(map.is_occluded(0, 0));
    assert_eq!(map.get(WIDTH as usize / 2, HEIGHT as usize / 2), -3);

    // Save and reload the rendering
    let out_path = dir.join("disparity.png");
    map.save_scaled(&out_path, true)?;
    let rendering = image::open(&out_path)?.to_rgb();

    assert_eq!(rendering.dimensions(), (WIDTH, HEIGHT));
    assert_eq!(rendering.get_pixel(0, 0), &Rgb([0, 255, 255]));

    // Save the float map as OpenEXR
    let float_path = dir.join("disparity.exr");
    map.save_float(&float_path)?;
    let bytes = std::fs::read(&float_path)?;
    assert_eq!(&bytes[..4], &[0x76, 0x2f, 0x31, 0x01]);

    std::fs::remove_dir_all(&dir)?;

    Ok(())
}

#[test]
fn float_map_is_saved_with_occlusions() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let dir = scratch_dir("float")?;

    let mut map = DisparityMap::new(3, 2);
    map.put(1, 0, -4);
    map.put(2, 1, 7);

    let path = dir.join("map.exr");
    map.save_float(&path)?;
    assert!(std::fs::metadata(&path)?.len() > 4);

    // a directory that does not exist cannot be written to
    let missing = dir.join("missing").join("map.exr");
    assert!(matches!(map.save_float(&missing), Err(Error::Exr(_))));

    std::fs::remove_dir_all(&dir)?;

    Ok(())
}

#[test]
fn missing_images_are_reported() {
    let missing = std::env::temp_dir().join("gc-disparity-missing").join("left.png");
    assert!(matches!(StereoFrame::open(&missing, &missing), Err(Error::Image(_))));
}
