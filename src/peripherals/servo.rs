//! servo.rs - joint angle pipeline for the leg servos
//!
//! Pure functions only. A planner typically composes them as
//! mirror → offset → clamp before handing the angle to [`crate::Pca9685`].

/// Thigh joint lower limit in degrees.
pub const SERVO_LIMIT_MIN_T: f32 = 20.0;
/// Thigh joint upper limit in degrees.
pub const SERVO_LIMIT_MAX_T: f32 = 160.0;
/// Shank joint lower limit in degrees.
pub const SERVO_LIMIT_MIN_S: f32 = 30.0;
/// Shank joint upper limit in degrees.
pub const SERVO_LIMIT_MAX_S: f32 = 150.0;

/// Reflects an angle for servos mounted reversed on one side of the body.
pub fn mirror(angle: f32) -> f32 {
    180.0 - angle
}

/// Mechanical zero-point correction.
pub fn offset(angle: f32, delta: f32) -> f32 {
    angle + delta
}

/// Saturates to the thigh range. Out-of-range input is clamped, never rejected.
pub fn clamp_thigh(angle: f32) -> f32 {
    JointLimits::DEFAULT.thigh.clamp(angle)
}

/// Saturates to the shank range. Out-of-range input is clamped, never rejected.
pub fn clamp_shank(angle: f32) -> f32 {
    JointLimits::DEFAULT.shank.clamp(angle)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum JointClass {
    Thigh,
    Shank,
}

/// Inclusive angular range in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AngleRange {
    pub min: f32,
    pub max: f32,
}

impl AngleRange {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// NaN passes through unchanged.
    pub fn clamp(&self, angle: f32) -> f32 {
        if angle > self.max {
            self.max
        } else if angle < self.min {
            self.min
        } else {
            angle
        }
    }

    pub fn contains(&self, angle: f32) -> bool {
        angle >= self.min && angle <= self.max
    }
}

/// Safe travel per joint class.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct JointLimits {
    pub thigh: AngleRange,
    pub shank: AngleRange,
}

impl JointLimits {
    pub const DEFAULT: Self = Self {
        thigh: AngleRange::new(SERVO_LIMIT_MIN_T, SERVO_LIMIT_MAX_T),
        shank: AngleRange::new(SERVO_LIMIT_MIN_S, SERVO_LIMIT_MAX_S),
    };

    pub fn range(&self, class: JointClass) -> &AngleRange {
        match class {
            JointClass::Thigh => &self.thigh,
            JointClass::Shank => &self.shank,
        }
    }

    pub fn clamp(&self, class: JointClass, angle: f32) -> f32 {
        self.range(class).clamp(angle)
    }
}

impl Default for JointLimits {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Calibration of one physical joint: where it is wired and how it is mounted.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Joint {
    /// PWM output the servo is wired to.
    pub channel: u8,
    pub class: JointClass,
    /// Mounted with reversed orientation.
    pub mirrored: bool,
    /// Zero-point correction in degrees, applied after mirroring.
    pub offset_deg: f32,
}

impl Joint {
    pub const fn new(channel: u8, class: JointClass) -> Self {
        Self {
            channel,
            class,
            mirrored: false,
            offset_deg: 0.0,
        }
    }

    pub const fn mirrored(mut self) -> Self {
        self.mirrored = true;
        self
    }

    pub const fn with_offset(mut self, offset_deg: f32) -> Self {
        self.offset_deg = offset_deg;
        self
    }

    /// Turns a logical joint angle into the angle the servo must be driven to.
    pub fn resolve(&self, angle: f32, limits: &JointLimits) -> f32 {
        let angle = if self.mirrored { mirror(angle) } else { angle };
        limits.clamp(self.class, offset(angle, self.offset_deg))
    }
}
