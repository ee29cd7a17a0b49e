pub mod album;
pub mod package;
pub mod photo;

pub use album::*;
pub use package::*;
pub use photo::*;
