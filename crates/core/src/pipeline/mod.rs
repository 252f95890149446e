pub mod frame_pipeline;
pub mod masking_session;
pub mod session_config;
pub mod session_logger;
