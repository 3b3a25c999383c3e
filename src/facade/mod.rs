pub mod journal;
mod probe;

pub use journal::Journal;
