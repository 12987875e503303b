//! Data preprocessing module
//!
//! Feature scaling fitted on the training partition and replayed unchanged
//! on test rows and live requests.

mod scaler;

pub use scaler::{NormalizerState, ScalerType};
