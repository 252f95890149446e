pub mod cpu_blur_compositor;
pub mod gaussian;
