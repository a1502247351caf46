//! Serial line parameters and their validation.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Baud rates accepted by [`SerialSettings::validate`].
pub const STANDARD_BAUD_RATES: &[u32] = &[
    50, 75, 110, 134, 150, 200, 300, 600, 1200, 1800, 2400, 4800, 9600, 19200, 38400, 57600,
    115200, 230400, 460800, 500000, 576000, 921600, 1000000, 1152000, 1500000, 2000000,
    2500000, 3000000, 3500000, 4000000,
];

pub const DEFAULT_BAUD_RATE: u32 = 9600;

const MIN_PORT_NAME_LEN: usize = 3;

/// Above this rate the inter-frame gap is fixed instead of scaled.
const FIXED_GAP_BAUD_RATE: u32 = 19200;
const FIXED_GAP: Duration = Duration::from_micros(1750);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("port name {0:?} is shorter than 3 characters")]
    InvalidPort(String),
    #[error("unsupported baud rate {0}")]
    InvalidBaudRate(u32),
    #[error("invalid data bits {0:?}, expected 5, 6, 7 or 8")]
    InvalidDataBits(String),
    #[error("invalid parity {0:?}, expected none, even or odd")]
    InvalidParity(String),
    #[error("invalid stop bits {0:?}, expected 1 or 2")]
    InvalidStopBits(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Parity {
    #[default]
    None,
    Even,
    Odd,
}

impl Parity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Even => "even",
            Self::Odd => "odd",
        }
    }
}

impl FromStr for Parity {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "n" | "none" => Ok(Self::None),
            "e" | "even" => Ok(Self::Even),
            "o" | "odd" => Ok(Self::Odd),
            _ => Err(SettingsError::InvalidParity(s.to_string())),
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DataBits {
    Five,
    Six,
    Seven,
    #[default]
    Eight,
}

impl DataBits {
    pub const fn bits(self) -> u8 {
        match self {
            Self::Five => 5,
            Self::Six => 6,
            Self::Seven => 7,
            Self::Eight => 8,
        }
    }
}

impl TryFrom<u8> for DataBits {
    type Error = SettingsError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            5 => Ok(Self::Five),
            6 => Ok(Self::Six),
            7 => Ok(Self::Seven),
            8 => Ok(Self::Eight),
            other => Err(SettingsError::InvalidDataBits(other.to_string())),
        }
    }
}

impl FromStr for DataBits {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u8>()
            .map_err(|_| SettingsError::InvalidDataBits(s.to_string()))
            .and_then(Self::try_from)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StopBits {
    #[default]
    One,
    Two,
}

impl StopBits {
    pub const fn bits(self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
        }
    }
}

impl TryFrom<u8> for StopBits {
    type Error = SettingsError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            other => Err(SettingsError::InvalidStopBits(other.to_string())),
        }
    }
}

impl FromStr for StopBits {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u8>()
            .map_err(|_| SettingsError::InvalidStopBits(s.to_string()))
            .and_then(Self::try_from)
    }
}

/// Physical line configuration of one serial port.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SerialSettings {
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    /// Timeout the OS driver applies while opening and configuring the port.
    pub open_timeout: Duration,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DataBits::default(),
            parity: Parity::default(),
            stop_bits: StopBits::default(),
            open_timeout: Duration::from_secs(1),
        }
    }
}

impl SerialSettings {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Self::default()
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_data_bits(mut self, data_bits: DataBits) -> Self {
        self.data_bits = data_bits;
        self
    }

    pub fn with_parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    pub fn with_stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.stop_bits = stop_bits;
        self
    }

    pub fn with_open_timeout(mut self, open_timeout: Duration) -> Self {
        self.open_timeout = open_timeout;
        self
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.port.chars().count() < MIN_PORT_NAME_LEN {
            return Err(SettingsError::InvalidPort(self.port.clone()));
        }
        if !STANDARD_BAUD_RATES.contains(&self.baud_rate) {
            return Err(SettingsError::InvalidBaudRate(self.baud_rate));
        }
        Ok(())
    }

    /// Bits on the wire per character: start + data + parity + stop.
    pub fn bits_per_char(&self) -> u32 {
        let parity = u32::from(self.parity != Parity::None);
        1 + u32::from(self.data_bits.bits()) + parity + u32::from(self.stop_bits.bits())
    }

    /// Duration of one character at the configured baud rate.
    pub fn char_time(&self) -> Duration {
        let baud = u64::from(self.baud_rate.max(1));
        Duration::from_micros(u64::from(self.bits_per_char()) * 1_000_000 / baud)
    }

    /// The 3.5-character gap that separates RTU frames.
    pub fn silent_interval(&self) -> Duration {
        if self.baud_rate > FIXED_GAP_BAUD_RATE {
            return FIXED_GAP;
        }
        let baud = u64::from(self.baud_rate.max(1));
        Duration::from_micros(u64::from(self.bits_per_char()) * 3_500_000 / baud)
    }
}

impl fmt::Display for SerialSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parity = match self.parity {
            Parity::None => 'N',
            Parity::Even => 'E',
            Parity::Odd => 'O',
        };
        write!(
            f,
            "{} {}/{}{}{}",
            self.port,
            self.baud_rate,
            self.data_bits.bits(),
            parity,
            self.stop_bits.bits()
        )
    }
}

#[cfg(feature = "serial")]
mod driver {
    use super::{DataBits, Parity, SerialSettings, StopBits};

    impl From<DataBits> for tokio_serial::DataBits {
        fn from(value: DataBits) -> Self {
            match value {
                DataBits::Five => Self::Five,
                DataBits::Six => Self::Six,
                DataBits::Seven => Self::Seven,
                DataBits::Eight => Self::Eight,
            }
        }
    }

    impl From<Parity> for tokio_serial::Parity {
        fn from(value: Parity) -> Self {
            match value {
                Parity::None => Self::None,
                Parity::Even => Self::Even,
                Parity::Odd => Self::Odd,
            }
        }
    }

    impl From<StopBits> for tokio_serial::StopBits {
        fn from(value: StopBits) -> Self {
            match value {
                StopBits::One => Self::One,
                StopBits::Two => Self::Two,
            }
        }
    }

    impl SerialSettings {
        pub(crate) fn builder(&self) -> tokio_serial::SerialPortBuilder {
            tokio_serial::new(&self.port, self.baud_rate)
                .data_bits(self.data_bits.into())
                .parity(self.parity.into())
                .stop_bits(self.stop_bits.into())
                .flow_control(tokio_serial::FlowControl::None)
                .timeout(self.open_timeout)
        }
    }
}
