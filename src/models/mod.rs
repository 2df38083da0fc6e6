pub mod caption;
pub mod common;
pub mod image;

pub use caption::*;
pub use common::*;
pub use image::*;
