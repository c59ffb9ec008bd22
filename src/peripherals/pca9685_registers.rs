//! pca9685_registers.rs - PCA9685 register map and bit definitions

use bitflags::bitflags;

/// Number of PWM outputs on one chip.
pub const CHANNEL_COUNT: usize = 16;

/// Ticks in one PWM period (12-bit counter).
pub const COUNTS_PER_PERIOD: u16 = 4096;
/// Largest value an ON or OFF count register can hold.
pub const MAX_COUNT: u16 = COUNTS_PER_PERIOD - 1;

pub const REG_MODE1: u8 = 0x00;
pub const REG_MODE2: u8 = 0x01;
/// LED0_ON_L; every channel occupies four registers from here on.
pub const REG_LED_BASE: u8 = 0x06;
pub const REG_PRE_SCALE: u8 = 0xFE;

/// Bytes per channel in a burst frame (ON-low, ON-high, OFF-low, OFF-high).
pub const BYTES_PER_CHANNEL: usize = 4;
/// Register address byte plus every channel's duty window.
pub const MAX_BURST_LEN: usize = 1 + BYTES_PER_CHANNEL * CHANNEL_COUNT;

bitflags! {
    /// MODE1 register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Mode1Flags: u8 {
        /// Respond to the LED All Call I2C address.
        const ALLCALL = 0x01;
        const SUB3 = 0x02;
        const SUB2 = 0x04;
        const SUB1 = 0x08;
        /// Oscillator off. The prescaler can only be written while asleep.
        const SLEEP = 0x10;
        /// Register address auto-increment, required for burst writes.
        const AUTO_INCREMENT = 0x20;
        const EXTCLK = 0x40;
        const RESTART = 0x80;
    }
}

bitflags! {
    /// MODE2 register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Mode2Flags: u8 {
        const OUTNE0 = 0x01;
        const OUTNE1 = 0x02;
        /// Totem-pole outputs instead of open-drain.
        const OUTDRV = 0x04;
        /// Outputs change on ACK instead of STOP.
        const OCH = 0x08;
        const INVRT = 0x10;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Mode1Flags {
    fn format(&self, f: defmt::Formatter<'_>) {
        defmt::write!(f, "Mode1Flags({=u8:#x})", self.bits());
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Mode2Flags {
    fn format(&self, f: defmt::Formatter<'_>) {
        defmt::write!(f, "Mode2Flags({=u8:#x})", self.bits());
    }
}

/// A validated channel number in `0..CHANNEL_COUNT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelIndex(u8);

impl ChannelIndex {
    /// Returns `None` when `index` is not a physical output.
    pub const fn new(index: u8) -> Option<Self> {
        if (index as usize) < CHANNEL_COUNT {
            Some(Self(index))
        } else {
            None
        }
    }

    pub const fn get(self) -> u8 {
        self.0
    }

    /// First of the channel's four consecutive registers.
    pub const fn base_register(self) -> u8 {
        REG_LED_BASE + 4 * self.0
    }
}

/// On/off tick pair for one channel within a 4096-tick period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DutyWindow {
    on: u16,
    off: u16,
}

impl DutyWindow {
    /// Window starting at tick 0. Counts above [`MAX_COUNT`] saturate.
    pub fn from_off(off: u16) -> Self {
        Self::new(0, off)
    }

    /// Counts above [`MAX_COUNT`] saturate.
    pub fn new(on: u16, off: u16) -> Self {
        Self {
            on: on.min(MAX_COUNT),
            off: off.min(MAX_COUNT),
        }
    }

    pub const fn on(self) -> u16 {
        self.on
    }

    pub const fn off(self) -> u16 {
        self.off
    }

    /// Register payload in chip order: ON-low, ON-high, OFF-low, OFF-high.
    pub fn to_bytes(self) -> [u8; BYTES_PER_CHANNEL] {
        // bit 12 of either count is a full-on/full-off override
        let [on_l, on_h] = self.on.min(MAX_COUNT).to_le_bytes();
        let [off_l, off_h] = self.off.min(MAX_COUNT).to_le_bytes();
        [on_l, on_h, off_l, off_h]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_index_rejects_one_past_last() {
        assert!(ChannelIndex::new(15).is_some());
        assert_eq!(ChannelIndex::new(16), None);
        assert_eq!(ChannelIndex::new(u8::MAX), None);
    }

    #[test]
    fn base_register_steps_by_four() {
        let first = ChannelIndex::new(0).unwrap();
        let last = ChannelIndex::new(15).unwrap();
        assert_eq!(first.base_register(), 0x06);
        assert_eq!(last.base_register(), 0x42);
    }

    #[test]
    fn duty_window_bytes_are_little_endian() {
        let window = DutyWindow::new(0x0123, 0x0abc);
        assert_eq!(window.to_bytes(), [0x23, 0x01, 0xbc, 0x0a]);
    }

    #[test]
    fn duty_window_saturates_at_twelve_bits() {
        let window = DutyWindow::new(5000, u16::MAX);
        assert_eq!(window.on(), MAX_COUNT);
        assert_eq!(window.off(), MAX_COUNT);
    }

    #[test]
    fn duty_window_never_encodes_full_off_bit() {
        assert_eq!(DutyWindow::new(0, 5000).to_bytes(), [0x00, 0x00, 0xff, 0x0f]);
        assert_eq!(DutyWindow::from_off(0x1000).to_bytes(), [0x00, 0x00, 0xff, 0x0f]);
        assert_eq!(DutyWindow::new(0x1388, 0).to_bytes(), [0xff, 0x0f, 0x00, 0x00]);
    }

    #[test]
    fn mode1_bits_match_datasheet() {
        let resume = Mode1Flags::RESTART | Mode1Flags::AUTO_INCREMENT | Mode1Flags::ALLCALL;
        assert_eq!(resume.bits(), 0xa1);
        assert_eq!(Mode1Flags::SLEEP.bits(), 0x10);
        assert_eq!(Mode1Flags::from_bits_retain(0xff), Mode1Flags::all());
    }

    #[test]
    fn burst_covers_all_channels() {
        assert_eq!(MAX_BURST_LEN, 65);
    }
}
