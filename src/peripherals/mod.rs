mod pca9685;
mod pca9685_registers;
mod servo;

pub use pca9685::*;
pub use pca9685_registers::*;
pub use servo::*;
