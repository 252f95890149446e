pub mod detection_history;
pub mod region_union;
