pub mod deadline_detector;
pub mod model_resolver;
pub mod onnx_yolo_detector;
pub mod unavailable_detector;
