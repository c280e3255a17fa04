pub mod domain;
pub mod pipeline;
pub mod supervisor;
pub mod traits;
