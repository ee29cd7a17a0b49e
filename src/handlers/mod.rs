pub mod blob;
pub mod multipart;
pub mod package;
pub mod photo;
pub mod reconcile;
pub mod upload;
