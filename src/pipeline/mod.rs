pub mod best_frame;
pub mod classifier_worker;
pub mod frame_slot;
pub mod main;
pub mod render;
pub mod stats;
