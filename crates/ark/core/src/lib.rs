pub mod env;
pub mod result;
#[cfg(feature = "signal")]
pub mod signal;
pub mod tracer;

pub use self::env::Infer;
