pub mod capture_clock;
pub mod capture_controller;
pub mod detector_mode_flag;
pub mod infrastructure;
pub mod override_slot;
pub mod rendered_frame_slot;
pub mod still_image_sink;
