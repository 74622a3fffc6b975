//! K-means clustering and the point layouts it is demonstrated on.

pub mod kmeans;
pub mod presets;

pub use kmeans::{ClusterPoint, KMeansConfig, KMeansEngine, KMeansStep};
pub use presets::KMeansPreset;
