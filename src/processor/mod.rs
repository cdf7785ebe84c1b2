pub mod engine;
pub mod geometry;
pub mod resizer;

pub use engine::ImageCrateEngine;
pub use geometry::{OutputLimits, TargetSize};
pub use resizer::Resizer;
