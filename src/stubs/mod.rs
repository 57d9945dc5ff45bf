pub mod runtime;
pub mod transport;
