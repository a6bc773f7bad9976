//! Transport mode of a display

use serde::{Deserialize, Serialize};

/// How DDC/CI traffic reaches the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IoMode {
    /// `/dev/i2c-N` character device.
    I2c,
    /// USB HID monitor control class. The HID layer paces itself, so no
    /// DDC/CI inter-message delays apply.
    Usb,
}

impl IoMode {
    pub fn name(self) -> &'static str {
        match self {
            IoMode::I2c => "I2C",
            IoMode::Usb => "USB",
        }
    }
}
