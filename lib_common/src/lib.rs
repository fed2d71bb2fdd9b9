// Declare the folder modules, gated by the matching cargo feature.

#[cfg(feature = "configs")]
pub mod configs;

#[cfg(feature = "loggers")]
pub mod loggers;

#[cfg(feature = "retrieve")]
pub mod retrieve;

#[cfg(feature = "core")]
pub mod core;

#[cfg(feature = "alerts")]
pub mod alerts;

#[cfg(feature = "sources")]
pub mod sources;
