pub mod ratings;
pub mod review;
pub mod tour;

pub use ratings::AggregateSync;
