//! Recording fakes for the bus and delay collaborators.
#![allow(dead_code)]

use std::collections::VecDeque;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};
use quadruped_servo::{Pca9685, Pca9685Config};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transfer {
    Write { address: u8, bytes: Vec<u8> },
    Read { address: u8, len: usize },
}

impl Transfer {
    pub fn write(address: u8, bytes: &[u8]) -> Self {
        Self::Write {
            address,
            bytes: bytes.to_vec(),
        }
    }

    pub fn read(address: u8, len: usize) -> Self {
        Self::Read { address, len }
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            Self::Write { bytes, .. } => bytes.as_slice(),
            Self::Read { .. } => &[],
        }
    }
}

/// Records every transfer, answers reads from `read_values`, and fails the
/// transfer numbered `fail_at` (counting from 0) with a NACK.
#[derive(Debug, Default)]
pub struct FakeBus {
    pub transfers: Vec<Transfer>,
    pub read_values: VecDeque<u8>,
    pub fail_at: Option<usize>,
}

impl FakeBus {
    pub fn with_reads(values: &[u8]) -> Self {
        Self {
            read_values: values.iter().copied().collect(),
            ..Default::default()
        }
    }

    pub fn failing_at(transfer: usize) -> Self {
        Self {
            fail_at: Some(transfer),
            ..Default::default()
        }
    }
}

impl ErrorType for FakeBus {
    type Error = ErrorKind;
}

impl I2c for FakeBus {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        for op in operations.iter_mut() {
            let number = self.transfers.len();
            match op {
                Operation::Write(bytes) => self.transfers.push(Transfer::write(address, bytes)),
                Operation::Read(buf) => {
                    self.transfers.push(Transfer::read(address, buf.len()));
                    for byte in buf.iter_mut() {
                        *byte = self.read_values.pop_front().unwrap_or(0);
                    }
                }
            }
            if self.fail_at == Some(number) {
                return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FakeDelay {
    pub total_ns: u64,
}

impl DelayNs for FakeDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns += u64::from(ns);
    }
}

pub fn driver(bus: FakeBus) -> Pca9685<FakeBus, FakeDelay> {
    Pca9685::new(bus, FakeDelay::default(), Pca9685Config::default())
}

pub const NACK: ErrorKind = ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data);
