//! Feature Extraction
//!
//! Turns a trailing window of GPS pings into the fixed-shape numeric vector
//! the prediction oracle scores.
//!
//! ## Modules
//! - `geo`: haversine distance, bearings and circular statistics
//! - `extractor`: windowed store read and the feature computation itself

pub mod geo;
mod extractor;

pub use extractor::{compute_features, FeatureExtractor, FeatureOutcome, FeatureVector, FEATURE_NAMES};
