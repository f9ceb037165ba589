// projector.rs — CPU ray-casting of an equirectangular panorama onto a flat frame
//
// Reproduces the GPU path pixel for pixel in terms of which source texel a
// destination pixel centre maps to (see `crate::camera`); only filtering
// differs, this path samples nearest. Cost is one ray per destination pixel
// per frame with no acceleration structure.

use glam::Vec2;
use image::{Rgba, RgbaImage};

use crate::camera::{direction_to_uv, pixel_center_ndc, Camera};
use crate::panorama::Panorama;

/// Texture coordinate the destination pixel (`x`, `y`) samples.
pub fn project_pixel(camera: &Camera, x: u32, y: u32, width: u32, height: u32) -> Vec2 {
    let (nx, ny) = pixel_center_ndc(x, y, width, height);
    direction_to_uv(camera.screen_ray(nx, ny))
}

/// Paint `frame` with the view of `panorama` seen through `camera`.
pub fn project(panorama: &Panorama, camera: &Camera, frame: &mut RgbaImage) {
    let (width, height) = frame.dimensions();
    if width == 0 || height == 0 {
        return;
    }

    // Hoist the camera frame out of the per-pixel loop.
    let basis = camera.basis();
    let scale = camera.half_fov_scale();

    for y in 0..height {
        for x in 0..width {
            let (nx, ny) = pixel_center_ndc(x, y, width, height);
            let ray = basis.ray(nx * camera.aspect * scale, ny * scale);
            let uv = direction_to_uv(ray);
            frame.put_pixel(x, y, Rgba(panorama.sample_nearest(uv.x, uv.y)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quadrant_panorama() -> Panorama {
        // Four vertical stripes, one per 90 degrees of longitude.
        let mut img = RgbaImage::new(8, 4);
        for (x, _, px) in img.enumerate_pixels_mut() {
            *px = Rgba([(x / 2) as u8 * 60, 0, 0, 255]);
        }
        Panorama::from_rgba(img, 4096).unwrap()
    }

    #[test]
    fn centre_pixel_samples_forward_stripe() {
        let pano = quadrant_panorama();
        let cam = Camera::new(90.0, 0.0, 40.0, 1.0);
        let mut frame = RgbaImage::new(9, 9);
        project(&pano, &cam, &mut frame);
        // forward = -Z, u = 0.25 -> texel x = floor(0.25 * 7) = 1 -> stripe 0
        assert_eq!(frame.get_pixel(4, 4).0, [0, 0, 0, 255]);
    }

    #[test]
    fn loop_matches_per_pixel_projection() {
        let pano = quadrant_panorama();
        let cam = Camera::new(200.0, 35.0, 75.0, 1.6);
        let mut frame = RgbaImage::new(16, 10);
        project(&pano, &cam, &mut frame);
        for (x, y) in [(0, 0), (15, 9), (7, 3), (11, 6)] {
            let uv = project_pixel(&cam, x, y, 16, 10);
            assert_eq!(frame.get_pixel(x, y).0, pano.sample_nearest(uv.x, uv.y));
        }
    }

    #[test]
    fn empty_frame_is_a_no_op() {
        let pano = quadrant_panorama();
        let mut frame = RgbaImage::new(0, 0);
        project(&pano, &Camera::new(0.0, 0.0, 75.0, 1.0), &mut frame);
    }
}
