pub mod clustering;
pub mod frame;
pub mod insertion;
pub mod loading;
pub mod prediction;
pub mod preprocessing;
pub mod schema;
pub mod transform;
pub mod validation;
