pub mod blur_compositor;
pub mod clip_shape;
pub mod mask_style;
