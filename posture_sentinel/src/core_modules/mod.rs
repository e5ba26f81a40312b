pub mod alert;
pub mod classifier;
pub mod clock;
pub mod connector;
pub mod geometry;
pub mod landmarks;
pub mod monitor;
pub mod shutdown;
