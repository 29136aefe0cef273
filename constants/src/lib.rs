/// Shared default values for the sampling workspace
pub mod calibration;
pub mod channel;
pub mod sampling;
