pub mod guidance;
pub mod training;
