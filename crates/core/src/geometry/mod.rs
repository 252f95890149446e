pub mod frame_transform;
pub mod transform_cache;
