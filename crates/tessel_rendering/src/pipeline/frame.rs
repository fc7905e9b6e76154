//! Per-frame context.
//!
//! Everything the visibility pipeline needs about "now" is passed in
//! explicitly; nothing is read from globals.

use glam::{Mat4, Vec3};

use super::RenderConfig;

/// View and projection of the rendering camera.
///
/// Projections follow the `[0, 1]` clip depth convention of
/// [`Mat4::perspective_rh`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// World to view.
    pub view: Mat4,
    /// View to clip.
    pub projection: Mat4,
    /// World-space eye position.
    pub position: Vec3,
}

impl Camera {
    /// Right-handed perspective camera looking from `eye` at `target`.
    #[must_use]
    pub fn look_at(eye: Vec3, target: Vec3, fov_y_radians: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            view: Mat4::look_at_rh(eye, target, Vec3::Y),
            projection: Mat4::perspective_rh(fov_y_radians, aspect, near, far),
            position: eye,
        }
    }

    /// World to clip.
    #[inline]
    #[must_use]
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    /// Distance along the view direction (positive in front of the camera).
    #[inline]
    #[must_use]
    pub fn view_depth(&self, world: Vec3) -> f32 {
        -self.view.transform_point3(world).z
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::look_at(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, std::f32::consts::FRAC_PI_2, 1.0, 0.1, 1000.0)
    }
}

/// Inputs for one rendered frame.
#[derive(Debug, Clone)]
pub struct FrameContext {
    /// Rendering camera.
    pub camera: Camera,
    /// Seconds since the scene started.
    pub time: f32,
    /// Toggles in effect for this frame.
    pub config: RenderConfig,
}

impl FrameContext {
    /// Frame context with the given camera and config at time zero.
    #[must_use]
    pub fn new(camera: Camera, config: RenderConfig) -> Self {
        Self { camera, time: 0.0, config }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_depth() {
        let camera = Camera::default();
        assert!((camera.view_depth(Vec3::ZERO) - 10.0).abs() < 1e-4);
        assert!(camera.view_depth(Vec3::new(0.0, 0.0, 20.0)) < 0.0);
    }

    #[test]
    fn test_origin_projects_inside_clip_space() {
        let camera = Camera::default();
        let clip = camera.view_projection() * glam::Vec4::new(0.0, 0.0, 0.0, 1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-4 && ndc.y.abs() < 1e-4);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }
}
