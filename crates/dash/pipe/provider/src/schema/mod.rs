#[cfg(feature = "arrow")]
pub mod arrow;
