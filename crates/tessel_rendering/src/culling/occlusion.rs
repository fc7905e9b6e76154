//! Tile-based occlusion proxy.
//!
//! A coarse screen-space grid of conservative depths. Opaque survivors of a
//! frame are rasterized into it as occluders; the next frame tests its
//! frustum survivors against it.
//!
//! ```text
//!   frame N   DrawIndirect(opaque) ──writes──▶ proxy[current]
//!   swap
//!   frame N+1 Cull ──reads──▶ proxy[previous]
//! ```
//!
//! Depths are NDC `[0, 1]`; a tile holds 1.0 until an occluder fully
//! covers it.

use glam::{Mat4, Vec2, Vec3, Vec4};

use super::Aabb;
use crate::pipeline::Camera;

/// Clip-space `w` below which a point counts as on or behind the eye.
const MIN_CLIP_W: f32 = 1e-5;

/// Screen footprint of a box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenRect {
    /// Minimum corner in tile units.
    pub min: Vec2,
    /// Maximum corner in tile units.
    pub max: Vec2,
    /// Smallest NDC depth of the box.
    pub nearest: f32,
    /// Largest NDC depth of the box.
    pub farthest: f32,
}

/// Statistics of the last frame's proxy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OcclusionStats {
    /// Occluders rasterized.
    pub occluders: u32,
    /// Tiles covered by at least one occluder.
    pub covered_tiles: u32,
}

/// Conservative depth grid.
#[derive(Debug, Clone)]
pub struct OcclusionProxy {
    width: u32,
    height: u32,
    depths: Vec<f32>,
    view_projection: Mat4,
    valid: bool,
    occluders: u32,
}

impl OcclusionProxy {
    /// Empty proxy of `tiles[0] x tiles[1]` tiles.
    #[must_use]
    pub fn new(tiles: [u32; 2]) -> Self {
        let width = tiles[0].max(1);
        let height = tiles[1].max(1);
        Self {
            width,
            height,
            depths: vec![1.0; (width * height) as usize],
            view_projection: Mat4::IDENTITY,
            valid: false,
            occluders: 0,
        }
    }

    /// Tile grid dimensions.
    #[must_use]
    pub const fn tiles(&self) -> [u32; 2] {
        [self.width, self.height]
    }

    /// Whether the proxy holds a frame's worth of occluders.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.valid
    }

    /// Starts a new frame rendered from `camera`. Clears every tile.
    pub fn begin(&mut self, camera: &Camera) {
        self.depths.fill(1.0);
        self.view_projection = camera.view_projection();
        self.valid = true;
        self.occluders = 0;
    }

    /// Marks the proxy unusable, e.g. after a scene clear or while
    /// occlusion culling is off.
    pub fn invalidate(&mut self) {
        self.depths.fill(1.0);
        self.valid = false;
        self.occluders = 0;
    }

    /// Resizes the grid. Invalidates the content.
    pub fn resize(&mut self, tiles: [u32; 2]) {
        *self = Self::new(tiles);
    }

    /// Stored depth of a tile.
    #[must_use]
    pub fn depth(&self, x: u32, y: u32) -> Option<f32> {
        (x < self.width && y < self.height).then(|| self.depths[(y * self.width + x) as usize])
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> OcclusionStats {
        OcclusionStats {
            occluders: self.occluders,
            covered_tiles: self.depths.iter().filter(|&&d| d < 1.0).count() as u32,
        }
    }

    /// Projects a world-space box. `None` if any corner is on or behind the
    /// eye plane, or the box lies entirely off screen.
    #[must_use]
    pub fn project(&self, bounds: &Aabb) -> Option<ScreenRect> {
        self.project_points(bounds).map(|(rect, _)| rect)
    }

    fn project_points(&self, bounds: &Aabb) -> Option<(ScreenRect, [Vec2; 8])> {
        let size = Vec2::new(self.width as f32, self.height as f32);
        let mut points = [Vec2::ZERO; 8];
        let mut min = Vec2::splat(f32::MAX);
        let mut max = Vec2::splat(f32::MIN);
        let mut nearest = f32::MAX;
        let mut farthest = f32::MIN;

        for (point, corner) in points.iter_mut().zip(bounds.corners()) {
            let clip = self.view_projection * Vec4::from((corner, 1.0));
            if clip.w <= MIN_CLIP_W {
                return None;
            }
            let ndc = clip.truncate() / clip.w;
            if ndc.z < 0.0 {
                return None;
            }
            // NDC y points up, tile rows go down.
            *point = Vec2::new(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5) * size;
            min = min.min(*point);
            max = max.max(*point);
            nearest = nearest.min(ndc.z);
            farthest = farthest.max(ndc.z);
        }

        if max.x < 0.0 || max.y < 0.0 || min.x > size.x || min.y > size.y {
            return None;
        }
        let rect = ScreenRect {
            min: min.max(Vec2::ZERO),
            max: max.min(size),
            nearest,
            farthest: farthest.min(1.0),
        };
        Some((rect, points))
    }

    /// Rasterizes an opaque box. Every tile lying entirely inside the box's
    /// silhouette keeps the smaller of its depth and the box's farthest
    /// depth.
    pub fn add_occluder(&mut self, bounds: &Aabb) {
        let Some((rect, points)) = self.project_points(bounds) else {
            return;
        };
        let hull = convex_hull(&points);
        if hull.len() < 3 {
            return;
        }

        let x0 = rect.min.x.ceil() as u32;
        let y0 = rect.min.y.ceil() as u32;
        let x1 = (rect.max.x.floor() as u32).min(self.width);
        let y1 = (rect.max.y.floor() as u32).min(self.height);
        for y in y0..y1 {
            for x in x0..x1 {
                let (fx, fy) = (x as f32, y as f32);
                let covered = [
                    Vec2::new(fx, fy),
                    Vec2::new(fx + 1.0, fy),
                    Vec2::new(fx, fy + 1.0),
                    Vec2::new(fx + 1.0, fy + 1.0),
                ]
                .iter()
                .all(|&p| hull_contains(&hull, p));
                if covered {
                    let tile = &mut self.depths[(y * self.width + x) as usize];
                    *tile = tile.min(rect.farthest);
                }
            }
        }
        self.occluders += 1;
    }

    /// Whether a world-space box is hidden behind the recorded occluders.
    ///
    /// Conservative: boxes crossing the eye plane, boxes off screen and any
    /// test against an invalid proxy report visible.
    #[must_use]
    pub fn is_occluded(&self, bounds: &Aabb) -> bool {
        if !self.valid {
            return false;
        }
        let Some(rect) = self.project(bounds) else {
            return false;
        };

        let x0 = rect.min.x.floor() as u32;
        let y0 = rect.min.y.floor() as u32;
        let x1 = (rect.max.x.ceil() as u32).min(self.width);
        let y1 = (rect.max.y.ceil() as u32).min(self.height);
        if x0 >= x1 || y0 >= y1 {
            return false;
        }
        (y0..y1).all(|y| (x0..x1).all(|x| self.depths[(y * self.width + x) as usize] < rect.nearest))
    }
}

/// Andrew's monotone chain; counter-clockwise in tile space, no collinear
/// points.
fn convex_hull(points: &[Vec2]) -> Vec<Vec2> {
    let mut sorted = points.to_vec();
    sorted.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    sorted.dedup();
    if sorted.len() < 3 {
        return sorted;
    }

    let cross = |o: Vec2, a: Vec2, b: Vec2| (a - o).perp_dot(b - o);
    let mut hull: Vec<Vec2> = Vec::with_capacity(sorted.len() * 2);
    for pass in [sorted.clone(), sorted.iter().rev().copied().collect()] {
        let start = hull.len();
        for p in pass {
            while hull.len() >= start + 2 && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0.0 {
                hull.pop();
            }
            hull.push(p);
        }
        hull.pop();
    }
    hull
}

fn hull_contains(hull: &[Vec2], p: Vec2) -> bool {
    (0..hull.len()).all(|i| {
        let a = hull[i];
        let b = hull[(i + 1) % hull.len()];
        (b - a).perp_dot(p - a) >= 0.0
    })
}

/// Nearest and farthest view depth of a box, for sort keys.
#[must_use]
pub fn view_depth_range(camera: &Camera, bounds: &Aabb) -> (f32, f32) {
    bounds
        .corners()
        .iter()
        .map(|&c: &Vec3| camera.view_depth(c))
        .fold((f32::MAX, f32::MIN), |(lo, hi), d| (lo.min(d), hi.max(d)))
}
