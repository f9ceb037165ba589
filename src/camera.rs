// camera.rs — viewing parameters and the projection convention shared by
// the GPU shader and the software projector.

use glam::{Mat4, Vec2, Vec3, Vec4};
use std::f32::consts::PI;

const NEAR: f32 = 1.0;
const FAR: f32 = 1100.0;

/// Where the viewer looks and how wide.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// Longitude in degrees, unbounded (wraps naturally).
    pub lon: f32,
    /// Latitude in degrees, kept inside the viewer's latitude limit.
    pub lat: f32,
    /// Vertical field of view in degrees.
    pub fov: f32,
    /// Viewport width / height.
    pub aspect: f32,
}

/// Orthonormal camera frame in world space.
#[derive(Debug, Clone, Copy)]
pub struct CameraBasis {
    pub forward: Vec3,
    pub right: Vec3,
    pub up: Vec3,
}

impl CameraBasis {
    /// Unit ray through the image-plane point (`sx`, `sy`) at distance 1.
    pub fn ray(&self, sx: f32, sy: f32) -> Vec3 {
        (self.forward + self.right * sx + self.up * sy).normalize()
    }
}

impl Camera {
    pub fn new(lon: f32, lat: f32, fov: f32, aspect: f32) -> Self {
        Self { lon, lat, fov, aspect }
    }

    /// Orbit position on the unit sphere: phi = 90 - lat, theta = lon.
    pub fn orbit_position(&self) -> Vec3 {
        let phi = (90.0 - self.lat).to_radians();
        let theta = self.lon.to_radians();
        Vec3::new(phi.sin() * theta.cos(), phi.cos(), phi.sin() * theta.sin())
    }

    /// The camera sits on its orbit and looks through the centre, so the view
    /// direction is the negated orbit position.
    pub fn basis(&self) -> CameraBasis {
        let forward = (-self.orbit_position()).normalize();
        let right = forward.cross(Vec3::Y).normalize();
        let up = right.cross(forward).normalize();
        CameraBasis { forward, right, up }
    }

    /// Tangent of half the vertical field of view.
    pub fn half_fov_scale(&self) -> f32 {
        (self.fov.to_radians() / 2.0).tan()
    }

    /// World-space ray through normalized device coordinates (`x` right,
    /// `y` up, both in [-1, 1]).
    pub fn screen_ray(&self, ndc_x: f32, ndc_y: f32) -> Vec3 {
        let scale = self.half_fov_scale();
        self.basis().ray(ndc_x * self.aspect * scale, ndc_y * scale)
    }

    /// Projection × view with the camera placed at the sphere centre. The GPU
    /// path unprojects through the inverse of this matrix.
    pub fn view_projection(&self) -> Mat4 {
        let b = self.basis();
        let proj = Mat4::perspective_rh(self.fov.to_radians(), self.aspect.max(1e-6), NEAR, FAR);
        let view = Mat4::look_to_rh(Vec3::ZERO, b.forward, Vec3::Y);
        proj * view
    }

    /// Ray direction the GPU shader derives for an NDC position.
    pub fn unproject(inv_view_projection: &Mat4, ndc_x: f32, ndc_y: f32) -> Vec3 {
        let p = *inv_view_projection * Vec4::new(ndc_x, ndc_y, 1.0, 1.0);
        (p.truncate() / p.w).normalize()
    }
}

/// Equirectangular texture coordinate of a view direction.
/// `u = (atan2(z, x) + pi) / 2pi`, `v = acos(y) / pi` (v = 0 at the top).
pub fn direction_to_uv(dir: Vec3) -> Vec2 {
    let theta = dir.z.atan2(dir.x);
    let phi = dir.y.clamp(-1.0, 1.0).acos();
    Vec2::new((theta + PI) / (2.0 * PI), phi / PI)
}

/// NDC of the centre of pixel (`x`, `y`) in a `width` × `height` target.
pub fn pixel_center_ndc(x: u32, y: u32, width: u32, height: u32) -> (f32, f32) {
    let nx = 2.0 * (x as f32 + 0.5) / width as f32 - 1.0;
    let ny = 1.0 - 2.0 * (y as f32 + 0.5) / height as f32;
    (nx, ny)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: Vec2, b: Vec2) {
        // u wraps at the seam; compare on the circle.
        let du = (a.x - b.x).abs();
        let du = du.min(1.0 - du);
        assert!(du < 1e-4 && (a.y - b.y).abs() < 1e-4, "{a:?} != {b:?}");
    }

    #[test]
    fn default_orientation_looks_down_negative_z() {
        let cam = Camera::new(90.0, 0.0, 75.0, 16.0 / 9.0);
        let f = cam.basis().forward;
        assert!(f.abs_diff_eq(Vec3::new(0.0, 0.0, -1.0), 1e-6));
    }

    #[test]
    fn positive_latitude_looks_down() {
        let cam = Camera::new(90.0, 30.0, 75.0, 1.0);
        assert!(cam.basis().forward.y < 0.0);
    }

    #[test]
    fn basis_is_orthonormal() {
        let b = Camera::new(33.0, -70.0, 60.0, 1.5).basis();
        assert!(b.forward.dot(b.right).abs() < 1e-5);
        assert!(b.forward.dot(b.up).abs() < 1e-5);
        assert!((b.right.length() - 1.0).abs() < 1e-5);
        assert!(b.up.y > 0.0);
    }

    #[test]
    fn screen_centre_samples_forward_direction() {
        let cam = Camera::new(90.0, 0.0, 75.0, 2.0);
        let uv = direction_to_uv(cam.screen_ray(0.0, 0.0));
        // forward = -Z: theta = -pi/2 -> u = 0.25, horizon -> v = 0.5
        assert_close(uv, Vec2::new(0.25, 0.5));
    }

    #[test]
    fn gpu_unprojection_matches_software_rays() {
        let samples = [(0.0, 0.0), (-1.0, -1.0), (1.0, 1.0), (0.5, -0.25), (-0.9, 0.7)];
        for cam in [
            Camera::new(90.0, 0.0, 75.0, 16.0 / 9.0),
            Camera::new(-140.0, 60.0, 30.0, 0.75),
            Camera::new(412.5, -85.0, 90.0, 1.0),
        ] {
            let inv = cam.view_projection().inverse();
            for (x, y) in samples {
                let software = direction_to_uv(cam.screen_ray(x, y));
                let gpu = direction_to_uv(Camera::unproject(&inv, x, y));
                assert_close(software, gpu);
            }
        }
    }

    #[test]
    fn pixel_centres_are_symmetric() {
        let (x0, y0) = pixel_center_ndc(0, 0, 4, 2);
        let (x1, y1) = pixel_center_ndc(3, 1, 4, 2);
        assert_eq!((x0, y0), (-0.75, 0.5));
        assert_eq!((x1, y1), (0.75, -0.5));
    }
}
