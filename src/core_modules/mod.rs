pub mod annotator;
pub mod blob;
pub mod blob_detector;
pub mod flicker;
pub mod frame_stack;
pub mod overlap;
pub mod preprocess;
pub mod snr;
pub mod tracker;
pub mod utils;
