pub mod artifact;
pub mod market;
