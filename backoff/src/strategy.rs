pub mod exponential;
pub mod fixed;
