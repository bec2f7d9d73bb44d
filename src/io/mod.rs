//! Local file system access: caller path resolution, flat file checks and uploads

pub mod local_file;
pub mod uploads;

pub use local_file::{LocalFile, resolve_in};
pub use uploads::UploadStore;
