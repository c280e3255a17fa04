pub mod checker;
pub mod sampler;
