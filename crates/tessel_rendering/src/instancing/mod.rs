//! Instance and draw-call tables.
//!
//! One table per renderer kind. Each instance of an asset gets its own copy
//! of the asset's draw-call templates so visibility can be decided per
//! instance and the survivors drawn with a single indirect call.

mod bones;
mod instance_data;
mod table;

pub use bones::{BoneRanges, BoneStorage};
pub use instance_data::{
    BoneInstanceState, BoneMatrix, Bucket, DrawCall, DrawCallData, InstanceData, InstanceId,
    IDENTITY_BONE,
};
pub use table::{InstanceRecord, InstanceTable};
