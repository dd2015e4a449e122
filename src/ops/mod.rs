pub mod labels;
pub mod shapes;
pub mod smoothing;
