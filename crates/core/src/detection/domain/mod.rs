pub mod detection_cascade;
pub mod detection_result;
pub mod face_detector;
pub mod face_prior;
pub mod face_tracker;
