#[allow(clippy::module_inception)]
pub mod result;

pub use result::{QueryRows, ResultRow};
