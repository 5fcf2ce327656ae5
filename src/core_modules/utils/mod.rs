pub mod image_helper;
pub mod report_writer;
