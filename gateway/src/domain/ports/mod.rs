//! Domain ports (traits)

pub mod upstream;

pub use upstream::Upstream;
