//! Frustum culling for view-dependent rendering.
//!
//! Extracts frustum planes from the view-projection matrix and tests
//! bounding volumes against them.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// A plane in 3D space (Ax + By + Cz + D = 0).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Plane {
    /// Normal X component.
    pub a: f32,
    /// Normal Y component.
    pub b: f32,
    /// Normal Z component.
    pub c: f32,
    /// Distance from origin.
    pub d: f32,
}

impl Plane {
    /// Creates a new plane.
    #[must_use]
    pub const fn new(a: f32, b: f32, c: f32, d: f32) -> Self {
        Self { a, b, c, d }
    }

    fn from_vec4(v: Vec4) -> Self {
        Self::new(v.x, v.y, v.z, v.w)
    }

    /// Normalizes the plane.
    #[must_use]
    pub fn normalized(self) -> Self {
        let len = self.normal().length();
        if len > 0.0 {
            Self::new(self.a / len, self.b / len, self.c / len, self.d / len)
        } else {
            self
        }
    }

    /// Plane normal.
    #[inline]
    #[must_use]
    pub fn normal(&self) -> Vec3 {
        Vec3::new(self.a, self.b, self.c)
    }

    /// Returns the signed distance from a point to the plane.
    #[inline]
    #[must_use]
    pub fn distance_to_point(&self, p: Vec3) -> f32 {
        self.normal().dot(p) + self.d
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner.
    pub min: Vec3,
    /// Maximum corner.
    pub max: Vec3,
}

impl Aabb {
    /// Creates a new AABB.
    #[must_use]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Returns the center of the AABB.
    #[inline]
    #[must_use]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Returns the half-extents of the AABB.
    #[inline]
    #[must_use]
    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Whether `min <= max` on every axis and nothing is NaN.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.min.cmple(self.max).all()
    }

    /// The eight corners.
    #[must_use]
    pub fn corners(&self) -> [Vec3; 8] {
        let (lo, hi) = (self.min, self.max);
        [
            Vec3::new(lo.x, lo.y, lo.z),
            Vec3::new(hi.x, lo.y, lo.z),
            Vec3::new(lo.x, hi.y, lo.z),
            Vec3::new(hi.x, hi.y, lo.z),
            Vec3::new(lo.x, lo.y, hi.z),
            Vec3::new(hi.x, lo.y, hi.z),
            Vec3::new(lo.x, hi.y, hi.z),
            Vec3::new(hi.x, hi.y, hi.z),
        ]
    }

    /// Enclosing box of this box after an affine transform.
    #[must_use]
    pub fn transformed(&self, transform: &Mat4) -> Self {
        let center = transform.transform_point3(self.center());
        let half = self.half_extents();
        // |M| * half gives the half extents of the rotated box.
        let extent = Vec3::new(
            transform.row(0).truncate().abs().dot(half),
            transform.row(1).truncate().abs().dot(half),
            transform.row(2).truncate().abs().dot(half),
        );
        Self::new(center - extent, center + extent)
    }
}

/// View frustum for culling.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Frustum {
    /// Left, right, bottom, top, near, far planes.
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Left plane index.
    pub const LEFT: usize = 0;
    /// Right plane index.
    pub const RIGHT: usize = 1;
    /// Bottom plane index.
    pub const BOTTOM: usize = 2;
    /// Top plane index.
    pub const TOP: usize = 3;
    /// Near plane index.
    pub const NEAR: usize = 4;
    /// Far plane index.
    pub const FAR: usize = 5;

    /// Extracts frustum planes from a view-projection matrix with `[0, 1]`
    /// clip depth.
    #[must_use]
    pub fn from_view_projection(m: &Mat4) -> Self {
        let (r0, r1, r2, r3) = (m.row(0), m.row(1), m.row(2), m.row(3));
        let mut planes = [Plane::default(); 6];
        planes[Self::LEFT] = Plane::from_vec4(r3 + r0).normalized();
        planes[Self::RIGHT] = Plane::from_vec4(r3 - r0).normalized();
        planes[Self::BOTTOM] = Plane::from_vec4(r3 + r1).normalized();
        planes[Self::TOP] = Plane::from_vec4(r3 - r1).normalized();
        // Depth runs 0..1, so the near plane is row 2 alone.
        planes[Self::NEAR] = Plane::from_vec4(r2).normalized();
        planes[Self::FAR] = Plane::from_vec4(r3 - r2).normalized();
        Self { planes }
    }

    /// Tests if an AABB intersects the frustum.
    #[must_use]
    pub fn test_aabb(&self, aabb: &Aabb) -> bool {
        let center = aabb.center();
        let half = aabb.half_extents();

        self.planes.iter().all(|plane| {
            // Projection interval radius of the box onto the plane normal
            let r = half.dot(plane.normal().abs());
            plane.distance_to_point(center) >= -r
        })
    }

    /// Tests if a sphere intersects the frustum.
    #[must_use]
    pub fn test_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.distance_to_point(center) >= -radius)
    }

    /// Converts planes to array format for GPU upload.
    #[must_use]
    pub fn as_arrays(&self) -> [[f32; 4]; 6] {
        self.planes.map(|p| [p.a, p.b, p.c, p.d])
    }
}

/// Freezes the frustum used for culling while the camera keeps moving.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrustumLock {
    locked: Option<Frustum>,
}

impl FrustumLock {
    /// Frustum to cull against this frame. Captures `live` the first frame
    /// the lock is on and releases it when `lock` goes false.
    pub fn resolve(&mut self, live: Frustum, lock: bool) -> Frustum {
        if lock {
            *self.locked.get_or_insert(live)
        } else {
            self.locked = None;
            live
        }
    }

    /// Whether a frustum is currently captured.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Camera;

    fn frustum() -> Frustum {
        Frustum::from_view_projection(&Camera::default().view_projection())
    }

    #[test]
    fn test_plane_normalization() {
        let plane = Plane::new(3.0, 4.0, 0.0, 10.0);
        let normalized = plane.normalized();

        // 3-4-5 triangle, so length is 5
        assert!((normalized.a - 0.6).abs() < 0.001);
        assert!((normalized.b - 0.8).abs() < 0.001);
    }

    #[test]
    fn test_aabb_center() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::splat(32.0));
        assert_eq!(aabb.center(), Vec3::splat(16.0));
        assert!(aabb.is_valid());
        assert!(!Aabb::new(Vec3::ONE, Vec3::ZERO).is_valid());
    }

    #[test]
    fn test_box_in_front_is_visible() {
        let f = frustum();
        assert!(f.test_aabb(&Aabb::new(Vec3::splat(-1.0), Vec3::ONE)));
        assert!(f.test_sphere(Vec3::ZERO, 1.0));
    }

    #[test]
    fn test_box_behind_camera_is_culled() {
        let f = frustum();
        let behind = Aabb::new(Vec3::new(-1.0, -1.0, 20.0), Vec3::new(1.0, 1.0, 22.0));
        assert!(!f.test_aabb(&behind));
    }

    #[test]
    fn test_box_far_to_the_side_is_culled() {
        let f = frustum();
        let side = Aabb::new(Vec3::new(100.0, -1.0, -1.0), Vec3::new(102.0, 1.0, 1.0));
        assert!(!f.test_aabb(&side));
    }

    #[test]
    fn test_box_beyond_far_plane_is_culled() {
        let f = frustum();
        let far = Aabb::new(Vec3::new(-1.0, -1.0, -2000.0), Vec3::new(1.0, 1.0, -1990.0));
        assert!(!f.test_aabb(&far));
    }

    #[test]
    fn test_transformed_aabb() {
        let aabb = Aabb::new(Vec3::splat(-1.0), Vec3::ONE);
        let moved = aabb.transformed(&Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0)));
        assert_eq!(moved.min, Vec3::new(4.0, -1.0, -1.0));
        assert_eq!(moved.max, Vec3::new(6.0, 1.0, 1.0));

        let rotated = aabb.transformed(&Mat4::from_rotation_y(std::f32::consts::FRAC_PI_4));
        let expected = std::f32::consts::SQRT_2;
        assert!((rotated.max.x - expected).abs() < 1e-5);
        assert!((rotated.max.y - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_frustum_lock() {
        let mut lock = FrustumLock::default();
        let a = frustum();
        let b = Frustum::from_view_projection(&Camera::look_at(
            Vec3::new(50.0, 0.0, 0.0),
            Vec3::ZERO,
            1.0,
            1.0,
            0.1,
            100.0,
        )
        .view_projection());

        assert_eq!(lock.resolve(a, true), a);
        assert_eq!(lock.resolve(b, true), a);
        assert!(lock.is_locked());
        assert_eq!(lock.resolve(b, false), b);
        assert!(!lock.is_locked());
    }
}
