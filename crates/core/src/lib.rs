//! Real-time face privacy masking for camera capture.
//!
//! Frames flow through [`pipeline::frame_pipeline::FramePipeline`]: the
//! detection cascade finds faces (or synthesizes regions when it cannot),
//! the mask renderer blurs them in display space, and the result is
//! recorded for the [`capture::capture_controller::CaptureController`],
//! which writes masked stills with the burst-refine protocol.

pub mod aggregation;
pub mod capture;
pub mod detection;
pub mod geometry;
pub mod pipeline;
pub mod profile;
pub mod rendering;
pub mod shared;
