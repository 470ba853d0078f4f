use super::*;

#[test]
fn zero_sigma_is_identity() {
    let src = RgbImage::from_fn(3, 2, |x, y| image::Rgb([x as u8 * 40, y as u8 * 90, 7]));
    let out = blur_rgb8(&src, 0.0).unwrap();
    assert_eq!(out, src);
}

#[test]
fn constant_image_is_unchanged() {
    let src = RgbImage::from_pixel(6, 5, image::Rgb([10, 20, 30]));
    let out = blur_rgb8(&src, 2.0).unwrap();
    assert_eq!(out, src);
}

#[test]
fn single_pixel_spreads_and_keeps_energy() {
    let mut src = RgbImage::new(9, 9);
    src.put_pixel(4, 4, image::Rgb([255, 255, 255]));
    let out = blur_rgb8(&src, 1.0).unwrap();

    let lit = out.pixels().filter(|p| p.0[0] != 0).count();
    assert!(lit > 1);
    let sum: u32 = out.pixels().map(|p| u32::from(p.0[0])).sum();
    assert!((sum as i32 - 255).abs() <= 12, "sum={sum}");
    assert!(out.get_pixel(4, 4).0[0] < 255);
}

#[test]
fn kernel_is_normalized() {
    let k = gaussian_kernel_q16(kernel_radius(6.25), 6.25).unwrap();
    assert_eq!(k.len(), 2 * 19 + 1);
    assert_eq!(k.iter().map(|w| u64::from(*w)).sum::<u64>(), 65536);
}

#[test]
fn non_finite_sigma_is_rejected() {
    let src = RgbImage::new(2, 2);
    assert!(blur_rgb8(&src, f32::NAN).is_err());
}

#[test]
fn huge_sigma_is_bounded_by_the_image() {
    let src = RgbImage::from_pixel(6, 5, image::Rgb([10, 20, 30]));
    let out = blur_rgb8(&src, 1.0e9).unwrap();
    assert_eq!(out, src);

    let mut dot = RgbImage::new(4, 4);
    dot.put_pixel(0, 0, image::Rgb([255, 255, 255]));
    let out = blur_rgb8(&dot, 1.0e6).unwrap();
    // Nearly flat: every pixel gets a share of the dot.
    assert!(out.pixels().all(|p| p.0[0] > 0));
}
