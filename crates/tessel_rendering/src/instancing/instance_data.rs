//! Instance and draw-call data structures for GPU upload.
//!
//! Every type here is `#[repr(C)]` and `Pod`; its layout is the contract
//! with the shaders that consume it.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

pub use tessel_core::DrawIndexedIndirectArgs as DrawCall;

/// Opacity bucket. Each renderer keeps one draw-call table per bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Bucket {
    /// Depth-tested, depth-writing geometry. Feeds the occlusion proxy.
    Opaque = 0,
    /// Blended geometry, drawn back to front.
    Transparent = 1,
}

impl Bucket {
    /// Both buckets, in draw order.
    pub const ALL: [Self; 2] = [Self::Opaque, Self::Transparent];

    /// Array index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Short lowercase name for labels and logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Opaque => "opaque",
            Self::Transparent => "transparent",
        }
    }
}

/// Dense index of an instance inside its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub u32);

impl InstanceId {
    /// Returned by lookups that have no answer.
    pub const INVALID: Self = Self(u32::MAX);

    /// Table index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Per-instance data sent to the GPU.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct InstanceData {
    /// Object to world, column-major.
    pub transform: [[f32; 4]; 4],
    /// Asset the instance shows.
    pub asset_id: u32,
    /// First bone matrix in the bone-deform buffer, in matrices.
    pub bone_deform_offset: u32,
    /// First entry in the bone-instance buffer.
    pub bone_instance_offset: u32,
    /// Bones used. Zero for static instances.
    pub bone_count: u32,
}

impl InstanceData {
    /// Size in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Static instance of `asset_id`.
    #[must_use]
    pub fn new(asset_id: u32, transform: &Mat4) -> Self {
        Self {
            transform: transform.to_cols_array_2d(),
            asset_id,
            bone_deform_offset: 0,
            bone_instance_offset: 0,
            bone_count: 0,
        }
    }

    /// Transform as a matrix.
    #[must_use]
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.transform)
    }
}

impl Default for InstanceData {
    fn default() -> Self {
        Self::new(0, &Mat4::IDENTITY)
    }
}

/// Metadata fetched by shaders through [`DrawCall::first_instance`].
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawCallData {
    /// Instance the draw call belongs to.
    pub instance_id: u32,
    /// First and last texture unit.
    pub texture_unit_range: [u32; 2],
    /// Culling volume slot.
    pub culling_volume_id: u32,
    /// Material ordering hint.
    pub render_priority: u32,
    /// Pads to 32 bytes.
    pub _padding: [u32; 3],
}

/// Animation state of one bone of one instance.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct BoneInstanceState {
    /// Playback time in seconds.
    pub time: f32,
    /// Animation sequence.
    pub sequence: u32,
    /// Parent bone, `u32::MAX` for roots.
    pub parent: u32,
    /// Reserved.
    pub flags: u32,
}

/// One bone-deform matrix.
pub type BoneMatrix = [[f32; 4]; 4];

/// Identity bone matrix.
pub const IDENTITY_BONE: BoneMatrix = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];
