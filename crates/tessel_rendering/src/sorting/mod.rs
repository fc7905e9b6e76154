//! Draw-call ordering.

mod transparency;

pub use transparency::{depth_sort_key, ordered_f32_bits, TransparencyOrderer};
