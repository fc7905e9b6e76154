//! Asset content as produced by a source, and as kept by the cache.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};
use tessel_core::RangeAllocation;

use super::AssetId;
use crate::culling::Aabb;
use crate::instancing::Bucket;

/// Which streaming renderer an asset belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetKind {
    /// Animated or static standalone model.
    Model,
    /// Placed structure, possibly decorated with further models.
    MapObject,
    /// Terrain chunk.
    Terrain,
    /// Water patch. Always transparent.
    Water,
}

impl AssetKind {
    /// All kinds, in renderer order.
    pub const ALL: [Self; 4] = [Self::Model, Self::MapObject, Self::Terrain, Self::Water];

    /// Position in [`Self::ALL`].
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Short lowercase name for labels and logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::MapObject => "map_object",
            Self::Terrain => "terrain",
            Self::Water => "water",
        }
    }
}

/// One vertex of shared geometry.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vertex {
    /// Object-space position.
    pub position: [f32; 3],
    /// Object-space normal.
    pub normal: [f32; 3],
    /// Texture coordinate.
    pub uv: [f32; 2],
}

impl Vertex {
    /// Size in bytes.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;
}

/// A draw call as described by the asset, relative to its own geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawCallDesc {
    /// First index inside the asset's index list.
    pub first_index: u32,
    /// Number of indices. A multiple of 3.
    pub index_count: u32,
    /// Added to every index, relative to the asset's vertex list.
    pub vertex_offset: i32,
    /// First and last texture unit used by the draw.
    pub texture_units: [u32; 2],
    /// Material ordering hint.
    pub render_priority: u32,
    /// Blended geometry, drawn in the transparent bucket.
    pub transparent: bool,
}

/// A sub-asset spawned wherever the parent is placed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decoration {
    /// Name of the decorating model.
    pub name: String,
    /// Transform relative to the parent.
    pub transform: Mat4,
}

/// Decoded asset content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetData {
    /// Vertex list.
    pub vertices: Vec<Vertex>,
    /// Triangle index list.
    pub indices: Vec<u32>,
    /// Draw calls over the lists above.
    pub draw_calls: Vec<DrawCallDesc>,
    /// Bones per instance. Zero for static assets.
    pub bone_count: u32,
    /// Object-space bounds.
    pub bounds: Aabb,
    /// Sub-assets placed with every instance.
    pub decorations: Vec<Decoration>,
}

impl AssetData {
    /// An axis-aligned box centered on the origin with one draw call.
    #[must_use]
    pub fn cuboid(half_extents: Vec3) -> Self {
        let h = half_extents;
        let corners = [
            Vec3::new(-h.x, -h.y, -h.z),
            Vec3::new(h.x, -h.y, -h.z),
            Vec3::new(h.x, h.y, -h.z),
            Vec3::new(-h.x, h.y, -h.z),
            Vec3::new(-h.x, -h.y, h.z),
            Vec3::new(h.x, -h.y, h.z),
            Vec3::new(h.x, h.y, h.z),
            Vec3::new(-h.x, h.y, h.z),
        ];
        let vertices = corners
            .iter()
            .map(|c| Vertex {
                position: c.to_array(),
                normal: c.normalize_or_zero().to_array(),
                uv: [f32::from(u8::from(c.x > 0.0)), f32::from(u8::from(c.y > 0.0))],
            })
            .collect();
        #[rustfmt::skip]
        let indices = vec![
            0, 2, 1, 0, 3, 2, // -z
            4, 5, 6, 4, 6, 7, // +z
            0, 1, 5, 0, 5, 4, // -y
            3, 7, 6, 3, 6, 2, // +y
            0, 4, 7, 0, 7, 3, // -x
            1, 2, 6, 1, 6, 5, // +x
        ];
        Self {
            vertices,
            indices,
            draw_calls: vec![DrawCallDesc {
                first_index: 0,
                index_count: 36,
                vertex_offset: 0,
                texture_units: [0, 0],
                render_priority: 0,
                transparent: false,
            }],
            bone_count: 0,
            bounds: Aabb::new(-h, h),
            decorations: Vec::new(),
        }
    }

    /// Splits the geometry into `parts` draw calls over consecutive faces.
    /// The flags say which parts are transparent; `parts` must divide 6.
    #[must_use]
    pub fn with_parts(mut self, transparent: &[bool]) -> Self {
        let parts = transparent.len().max(1) as u32;
        let per_part = self.indices.len() as u32 / parts / 3 * 3;
        self.draw_calls = transparent
            .iter()
            .enumerate()
            .map(|(i, &transparent)| DrawCallDesc {
                first_index: i as u32 * per_part,
                index_count: per_part,
                vertex_offset: 0,
                texture_units: [i as u32, i as u32],
                render_priority: i as u32,
                transparent,
            })
            .collect();
        self
    }

    /// Marks every draw call transparent.
    #[must_use]
    pub fn transparent(mut self) -> Self {
        for draw in &mut self.draw_calls {
            draw.transparent = true;
        }
        self
    }

    /// Gives the asset a skeleton.
    #[must_use]
    pub fn with_bones(mut self, bone_count: u32) -> Self {
        self.bone_count = bone_count;
        self
    }

    /// Adds a decoration.
    #[must_use]
    pub fn with_decoration(mut self, name: impl Into<String>, transform: Mat4) -> Self {
        self.decorations.push(Decoration {
            name: name.into(),
            transform,
        });
        self
    }

    /// Checks internal consistency. Returns what is wrong.
    ///
    /// # Errors
    ///
    /// A description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if !self.bounds.is_valid() {
            return Err(format!("inverted bounds {:?}", self.bounds));
        }
        let vertex_count = self.vertices.len() as i64;
        for (i, draw) in self.draw_calls.iter().enumerate() {
            if draw.index_count % 3 != 0 {
                return Err(format!("draw call {i}: index count {} is not a multiple of 3", draw.index_count));
            }
            let end = u64::from(draw.first_index) + u64::from(draw.index_count);
            if end > self.indices.len() as u64 {
                return Err(format!("draw call {i}: indices {}..{end} out of range", draw.first_index));
            }
            let range = draw.first_index as usize..end as usize;
            let out_of_range = self.indices[range].iter().any(|&index| {
                let vertex = i64::from(index) + i64::from(draw.vertex_offset);
                vertex < 0 || vertex >= vertex_count
            });
            if out_of_range {
                return Err(format!("draw call {i}: references a missing vertex"));
            }
        }
        Ok(())
    }
}

/// Load state of a cached asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetStatus {
    /// The elected loader is still working.
    Loading,
    /// Geometry and templates are usable.
    Ready,
    /// Loading failed. Terminal; never retried.
    Failed,
}

/// A draw call rebased onto the shared geometry buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCallTemplate {
    /// First index in the shared index buffer.
    pub first_index: u32,
    /// Number of indices.
    pub index_count: u32,
    /// Base vertex in the shared vertex buffer.
    pub vertex_offset: i32,
    /// First and last texture unit.
    pub texture_unit_range: [u32; 2],
    /// Material ordering hint.
    pub render_priority: u32,
    /// Culling volume slot (the owning asset's id).
    pub culling_volume_id: u32,
}

/// Device-side bounds of one asset, indexed by asset id.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct CullingVolume {
    /// Minimum corner, w unused.
    pub min: [f32; 4],
    /// Maximum corner, w unused.
    pub max: [f32; 4],
}

impl From<Aabb> for CullingVolume {
    fn from(aabb: Aabb) -> Self {
        Self {
            min: aabb.min.extend(0.0).to_array(),
            max: aabb.max.extend(0.0).to_array(),
        }
    }
}

/// An asset as held by the cache.
///
/// Created once per key, written only by the thread elected to load it and
/// shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct LoadedAsset {
    /// Dense id inside the owning cache.
    pub id: AssetId,
    /// Name the asset was requested by.
    pub debug_name: String,
    /// Renderer kind.
    pub kind: AssetKind,
    /// Load state.
    pub status: AssetStatus,
    /// Byte range in the shared vertex buffer.
    pub vertex_range: RangeAllocation,
    /// Byte range in the shared index buffer.
    pub index_range: RangeAllocation,
    /// Templates per bucket, indexed by [`Bucket::index`].
    pub templates: [Vec<DrawCallTemplate>; 2],
    /// Bones per instance.
    pub bone_count: u32,
    /// Whether instances need bone ranges.
    pub is_animated: bool,
    /// Object-space bounds.
    pub culling_volume: Aabb,
    /// Sub-assets spawned with each instance.
    pub decorations: Vec<Decoration>,
}

impl LoadedAsset {
    /// A record in the `Loading` state.
    #[must_use]
    pub fn loading(id: AssetId, debug_name: &str, kind: AssetKind) -> Self {
        Self {
            id,
            debug_name: debug_name.to_owned(),
            kind,
            status: AssetStatus::Loading,
            vertex_range: RangeAllocation::default(),
            index_range: RangeAllocation::default(),
            templates: [Vec::new(), Vec::new()],
            bone_count: 0,
            is_animated: false,
            culling_volume: Aabb::default(),
            decorations: Vec::new(),
        }
    }

    /// Templates of one bucket.
    #[inline]
    #[must_use]
    pub fn templates(&self, bucket: Bucket) -> &[DrawCallTemplate] {
        &self.templates[bucket.index()]
    }

    /// Templates across both buckets.
    #[must_use]
    pub fn draw_call_count(&self) -> usize {
        self.templates[0].len() + self.templates[1].len()
    }

    /// Whether the asset can be instanced.
    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status == AssetStatus::Ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cuboid_is_valid() {
        let data = AssetData::cuboid(Vec3::ONE);
        assert_eq!(data.vertices.len(), 8);
        assert_eq!(data.indices.len(), 36);
        assert!(data.validate().is_ok());
    }

    #[test]
    fn test_parts_split_indices() {
        let data = AssetData::cuboid(Vec3::ONE).with_parts(&[false, true, false]);
        assert_eq!(data.draw_calls.len(), 3);
        assert_eq!(data.draw_calls[1].first_index, 12);
        assert!(data.draw_calls[1].transparent);
        assert!(data.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_ranges() {
        let mut data = AssetData::cuboid(Vec3::ONE);
        data.draw_calls[0].index_count = 39;
        assert!(data.validate().is_err());

        let mut data = AssetData::cuboid(Vec3::ONE);
        data.draw_calls[0].vertex_offset = 4;
        assert!(data.validate().is_err());

        let mut data = AssetData::cuboid(Vec3::ONE);
        data.draw_calls[0].index_count = 35;
        assert!(data.validate().is_err());
    }

    #[test]
    fn test_vertex_layout() {
        assert_eq!(Vertex::SIZE, 32);
        let volume = CullingVolume::from(Aabb::new(Vec3::splat(-1.0), Vec3::splat(2.0)));
        assert_eq!(volume.max, [2.0, 2.0, 2.0, 0.0]);
    }
}
