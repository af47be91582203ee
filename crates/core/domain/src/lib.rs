pub mod reading;

pub use reading::{ANALOG_SCALE, Reading, now_epoch_s};
