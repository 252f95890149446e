pub mod base_layer;
pub mod domain;
pub mod infrastructure;
pub mod mask_renderer;
