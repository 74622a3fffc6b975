//! A small fully connected network trained by single-example backprop, and
//! the playground loop that feeds it 2D datasets.

pub mod datasets;
pub mod network;
pub mod playground;

pub use datasets::Dataset;
pub use network::{Activation, Layer, Network, Neuron};
pub use playground::{NeuralConfig, NeuralPlayground, TopologyLimits};
