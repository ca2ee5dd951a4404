// Data model shared by every sanitization pass

pub mod form;
pub mod geometry;

pub use form::*;
pub use geometry::*;
