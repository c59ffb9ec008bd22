//! pca9685.rs - blocking PCA9685 16-channel PWM driver for hobby servos
//!
//! The driver owns its I2C transport. Every operation is a short blocking
//! exchange and takes `&mut self`; sharing one bus between several drivers is
//! left to the caller (hold a lock for the whole operation, not per register).
//!
//! Failures are returned, never retried. A failed step in the middle of
//! [`Pca9685::set_clock_prescaler`] leaves the chip in whatever mode the
//! preceding steps produced.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{ErrorKind, I2c};
use heapless::Vec;

use super::pca9685_registers::{
    BYTES_PER_CHANNEL, CHANNEL_COUNT, COUNTS_PER_PERIOD, ChannelIndex, DutyWindow, MAX_BURST_LEN,
    MAX_COUNT, Mode1Flags, Mode2Flags, REG_MODE1, REG_MODE2, REG_PRE_SCALE,
};
use super::servo::{Joint, JointLimits};

pub const PCA9685_DEFAULT_I2C_ADDRESS: u8 = 0x40;
/// LED All Call address, answered by every chip with `Mode1Flags::ALLCALL` set.
pub const PCA9685_ALLCALL_I2C_ADDRESS: u8 = 0x70;
pub const PCA9685_OSCILLATOR_HZ: u32 = 25_000_000;

/// The chip treats smaller prescaler values as 3.
pub const PRESCALER_MIN: u8 = 3;
pub const PRESCALER_MAX: u8 = u8::MAX;

/// Measured: the internal oscillator runs about 2% fast.
pub const FREQUENCY_CORRECTION: f32 = 0.98;
/// Oscillator start-up time after leaving sleep.
pub const SETTLE_DELAY_MS: u32 = 5;

/// Degrees to ticks, fitted for the leg servos at 50 Hz.
pub const ANGLE_TO_COUNT_SLOPE: f32 = 2.276;
/// OFF count for 0°.
pub const ANGLE_ZERO_COUNT: u16 = 102;

const MAX_BURST_PAYLOAD: usize = MAX_BURST_LEN - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Pca9685Error {
    #[error("I2C transfer failed at register {register:#04x}: {kind:?}")]
    TransportFailure { register: u8, kind: ErrorKind },
    #[error("Invalid channel index: {index} >= {count}", count = CHANNEL_COUNT)]
    InvalidChannelIndex { index: u8 },
    #[error("Channels {first}..{first}+{count} exceed the {max} outputs", max = CHANNEL_COUNT)]
    ChannelRangeOverflow { first: u8, count: usize },
    #[error("Burst payload of {len} bytes does not fit one frame")]
    BurstTooLong { len: usize },
    #[error("PWM frequency must be finite and positive")]
    InvalidFrequency,
    #[error("Prescaler {prescaler} outside {min}..={max}", min = PRESCALER_MIN, max = PRESCALER_MAX)]
    PrescalerOutOfRange { prescaler: i32 },
}

/// Driver configuration
///
/// # Example
///
/// ```ignore
/// let config = Pca9685Config {
///     address: PCA9685_ALLCALL_I2C_ADDRESS,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Pca9685Config {
    /// 7-bit I2C address
    pub address: u8,
    /// Internal oscillator frequency in Hz
    pub oscillator_hz: u32,
    /// Multiplier applied to a requested PWM frequency before computing the prescaler
    pub frequency_correction: f32,
    /// Wait after waking the oscillator, in milliseconds
    pub settle_delay_ms: u32,
}

impl Default for Pca9685Config {
    fn default() -> Self {
        Self {
            address: PCA9685_DEFAULT_I2C_ADDRESS,
            oscillator_hz: PCA9685_OSCILLATOR_HZ,
            frequency_correction: FREQUENCY_CORRECTION,
            settle_delay_ms: SETTLE_DELAY_MS,
        }
    }
}

/// Prescaler for a PWM frequency:
/// `round(oscillator / (4096 * freq * correction)) - 1`.
///
/// 50 Hz with the default config gives 124.
pub fn prescaler_for_frequency(freq_hz: f32, config: &Pca9685Config) -> Result<u8, Pca9685Error> {
    if !freq_hz.is_finite() || freq_hz <= 0.0 {
        return Err(Pca9685Error::InvalidFrequency);
    }

    let corrected = freq_hz * config.frequency_correction;
    let prescaler =
        libm::roundf(config.oscillator_hz as f32 / (COUNTS_PER_PERIOD as f32 * corrected)) - 1.0;

    if !(f32::from(PRESCALER_MIN)..=f32::from(PRESCALER_MAX)).contains(&prescaler) {
        return Err(Pca9685Error::PrescalerOutOfRange {
            prescaler: prescaler as i32,
        });
    }
    Ok(prescaler as u8)
}

/// OFF tick for a servo angle: `trunc(angle * 2.276 + 0.5) + 102`.
///
/// Saturating and monotonic: negative angles give 102 and anything past
/// [`MAX_COUNT`] gives `MAX_COUNT`. NaN gives 102.
pub fn angle_to_off_count(angle: f32) -> u16 {
    // float-to-int `as` saturates at both ends
    let ticks = (angle * ANGLE_TO_COUNT_SLOPE + 0.5) as u16;
    ticks.saturating_add(ANGLE_ZERO_COUNT).min(MAX_COUNT)
}

/// PCA9685 driver
pub struct Pca9685<I, D> {
    i2c: I,
    delay: D,
    config: Pca9685Config,
}

impl<I, D> Pca9685<I, D>
where
    I: I2c,
    D: DelayNs,
{
    /// Wraps the bus without touching the chip. Call [`Self::set_frequency`]
    /// before programming channels: it enables the auto-increment mode burst
    /// writes rely on.
    pub fn new(i2c: I, delay: D, config: Pca9685Config) -> Self {
        Self { i2c, delay, config }
    }

    pub fn config(&self) -> &Pca9685Config {
        &self.config
    }

    /// Gives back the bus and delay.
    pub fn release(self) -> (I, D) {
        (self.i2c, self.delay)
    }

    // -----------------------------------------------------------------------
    // Register access
    // -----------------------------------------------------------------------

    /// Sends `[register, value]`.
    pub fn write_register(&mut self, register: u8, value: u8) -> Result<(), Pca9685Error> {
        self.i2c
            .write(self.config.address, &[register, value])
            .map_err(transport_failure(register))?;
        trace!("write reg [{=u8:#x}] = {=u8:#x}", register, value);
        Ok(())
    }

    /// Sends `[register]`, then reads one byte in a separate transfer.
    pub fn read_register(&mut self, register: u8) -> Result<u8, Pca9685Error> {
        self.i2c
            .write(self.config.address, &[register])
            .map_err(transport_failure(register))?;

        let mut buf = [0u8; 1];
        self.i2c
            .read(self.config.address, &mut buf)
            .map_err(transport_failure(register))?;

        let [value] = buf;
        trace!("read reg [{=u8:#x}] = {=u8:#x}", register, value);
        Ok(value)
    }

    /// Sends `[first_register, payload...]` as one transfer. Needs
    /// auto-increment to land on consecutive registers.
    pub fn write_burst(&mut self, first_register: u8, payload: &[u8]) -> Result<(), Pca9685Error> {
        let too_long = Pca9685Error::BurstTooLong { len: payload.len() };
        let mut frame: Vec<u8, MAX_BURST_LEN> = Vec::new();
        frame.push(first_register).map_err(|_| too_long)?;
        frame.extend_from_slice(payload).map_err(|_| too_long)?;

        self.i2c
            .write(self.config.address, &frame)
            .map_err(transport_failure(first_register))?;
        trace!("burst [{=u8:#x}] {=usize} bytes", first_register, payload.len());
        Ok(())
    }

    pub fn mode1(&mut self) -> Result<Mode1Flags, Pca9685Error> {
        self.read_register(REG_MODE1).map(Mode1Flags::from_bits_retain)
    }

    /// Writes MODE2 (output driver configuration).
    pub fn set_output_mode(&mut self, mode: Mode2Flags) -> Result<(), Pca9685Error> {
        self.write_register(REG_MODE2, mode.bits())
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Programs the prescaler: sleep, write PRE_SCALE, wake, then restart
    /// with auto-increment and all-call enabled.
    ///
    /// The raw value is not validated; the chip treats anything below 3 as 3.
    /// Use [`Pca9685::set_frequency`] for a range-checked value.
    pub fn set_clock_prescaler(&mut self, prescaler: u8) -> Result<(), Pca9685Error> {
        debug!("setting prescaler {=u8}", prescaler);

        self.write_register(REG_MODE1, Mode1Flags::ALLCALL.bits())?;

        let old = self.mode1()?;
        let asleep = old.difference(Mode1Flags::RESTART).union(Mode1Flags::SLEEP);
        self.write_register(REG_MODE1, asleep.bits())?;

        self.write_register(REG_PRE_SCALE, prescaler)?;

        self.write_register(REG_MODE1, old.bits())?;
        self.delay.delay_ms(self.config.settle_delay_ms);

        let resumed =
            old | Mode1Flags::RESTART | Mode1Flags::AUTO_INCREMENT | Mode1Flags::ALLCALL;
        self.write_register(REG_MODE1, resumed.bits())
    }

    /// Sets the PWM frequency shared by all channels and returns the
    /// prescaler written. Rejected frequencies touch no register.
    pub fn set_frequency(&mut self, freq_hz: f32) -> Result<u8, Pca9685Error> {
        let prescaler = prescaler_for_frequency(freq_hz, &self.config).inspect_err(|_| {
            error!("no prescaler for {=f32} Hz", freq_hz);
        })?;
        self.set_clock_prescaler(prescaler)?;
        Ok(prescaler)
    }

    // -----------------------------------------------------------------------
    // Channels
    // -----------------------------------------------------------------------

    /// Programs one channel's ON/OFF window. Nonzero `on` staggers the
    /// channel's phase.
    pub fn set_duty_window(&mut self, index: u8, window: DutyWindow) -> Result<(), Pca9685Error> {
        let channel = checked_channel(index)?;
        self.write_burst(channel.base_register(), &window.to_bytes())
    }

    /// Drives one servo to `angle` degrees. An out-of-range index sends nothing.
    pub fn set_channel(&mut self, index: u8, angle: f32) -> Result<(), Pca9685Error> {
        let channel = checked_channel(index)?;
        let off = angle_to_off_count(angle);
        trace!("index {=u8}: {=f32} deg, off {=u16}", index, angle, off);
        self.write_burst(channel.base_register(), &DutyWindow::from_off(off).to_bytes())
    }

    /// Drives `angles.len()` consecutive channels starting at `first` in a
    /// single transfer.
    pub fn set_channel_range(&mut self, first: u8, angles: &[f32]) -> Result<(), Pca9685Error> {
        let channel = checked_channel(first)?;
        if usize::from(first) + angles.len() > CHANNEL_COUNT {
            error!("channels {=u8}+{=usize} out of range", first, angles.len());
            return Err(Pca9685Error::ChannelRangeOverflow {
                first,
                count: angles.len(),
            });
        }
        if angles.is_empty() {
            return Ok(());
        }

        let mut payload: Vec<u8, MAX_BURST_PAYLOAD> = Vec::new();
        for &angle in angles {
            let window = DutyWindow::from_off(angle_to_off_count(angle));
            payload
                .extend_from_slice(&window.to_bytes())
                .map_err(|_| Pca9685Error::BurstTooLong {
                    len: angles.len() * BYTES_PER_CHANNEL,
                })?;
        }
        self.write_burst(channel.base_register(), &payload)
    }

    /// Drives every channel in one transfer so all joints move together.
    pub fn set_all_channels(&mut self, angles: &[f32; CHANNEL_COUNT]) -> Result<(), Pca9685Error> {
        self.set_channel_range(0, angles)
    }

    /// Resolves `angle` through the joint's calibration and limits, then
    /// drives its channel.
    pub fn set_joint(
        &mut self,
        joint: &Joint,
        angle: f32,
        limits: &JointLimits,
    ) -> Result<(), Pca9685Error> {
        self.set_channel(joint.channel, joint.resolve(angle, limits))
    }
}

#[cfg(feature = "embassy")]
impl<I: I2c> Pca9685<I, embassy_time::Delay> {
    pub fn new_with_default_address(i2c: I) -> Self {
        Self::new(i2c, embassy_time::Delay, Pca9685Config::default())
    }
}

fn checked_channel(index: u8) -> Result<ChannelIndex, Pca9685Error> {
    ChannelIndex::new(index).ok_or_else(|| {
        error!("index {=u8} out of range", index);
        Pca9685Error::InvalidChannelIndex { index }
    })
}

fn transport_failure<E: embedded_hal::i2c::Error>(
    register: u8,
) -> impl FnOnce(E) -> Pca9685Error {
    move |err| {
        error!("PCA9685 transfer failed, reg: {=u8:#x}", register);
        Pca9685Error::TransportFailure {
            register,
            kind: err.kind(),
        }
    }
}
