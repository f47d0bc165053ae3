//! House Price Model Server
//!
//! Serves fitted house price models over HTTP: a gradient boosted tree
//! ensemble over tabular listing features and a convolutional regressor over
//! house photos.

pub mod backend;
pub mod commands;
pub mod dispatch;
pub mod http;
pub mod loader;
pub mod registry;
