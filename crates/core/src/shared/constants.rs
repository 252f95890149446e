pub const YOLO_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const YOLO_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

/// Directory name used under the platform cache/data dir for downloaded models.
pub const APP_CACHE_DIR_NAME: &str = "FaceMask";

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];

/// Expected camera frame interval at 30 fps.
pub const EXPECTED_FRAME_INTERVAL_MS: f64 = 1000.0 / 30.0;

/// Detect + render time above which a frame is reported as slow.
pub const SLOW_FRAME_THRESHOLD_MS: f64 = 50.0;

/// Upper bound for any adaptive blur radius, in display pixels.
pub const MAX_BLUR_RADIUS: u32 = 120;
