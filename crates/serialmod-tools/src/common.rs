use clap::Args;
use serialmod_client::{ClientConfig, ModbusClient};
use serialmod_core::FramingMode;
use serialmod_core::numeric::WordOrder;
use serialmod_datalink::{
    DataBits, DataLinkError, Parity, SerialPortChannel, SerialSettings, StopBits,
};
use std::time::Duration;

#[derive(Debug, Clone, Args)]
pub struct SerialConnectionArgs {
    /// Serial device, e.g. /dev/ttyUSB0 or COM3.
    #[arg(long)]
    pub port: String,
    #[arg(long, default_value_t = 9600)]
    pub baud: u32,
    /// none, even or odd.
    #[arg(long, default_value = "none")]
    pub parity: Parity,
    #[arg(long, default_value = "8")]
    pub data_bits: DataBits,
    #[arg(long, default_value = "1")]
    pub stop_bits: StopBits,
    /// rtu or ascii.
    #[arg(long, default_value = "rtu", value_parser = parse_framing)]
    pub framing: FramingMode,
    /// Per-attempt response timeout in milliseconds.
    #[arg(long, default_value_t = 1000)]
    pub timeout: u64,
    /// Total attempts per request.
    #[arg(long, default_value_t = 3)]
    pub retries: u8,
}

impl SerialConnectionArgs {
    pub fn settings(&self) -> SerialSettings {
        SerialSettings::new(self.port.clone())
            .with_baud_rate(self.baud)
            .with_parity(self.parity)
            .with_data_bits(self.data_bits)
            .with_stop_bits(self.stop_bits)
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::default()
            .with_framing(self.framing)
            .with_timeout(Duration::from_millis(self.timeout))
            .with_max_retries(self.retries)
    }
}

/// Opens the port. Must run inside a Tokio runtime.
pub fn build_client(
    args: &SerialConnectionArgs,
) -> Result<ModbusClient<SerialPortChannel>, DataLinkError> {
    let settings = args.settings();
    let channel = SerialPortChannel::open(settings)?;
    Ok(ModbusClient::with_config(channel, args.config()))
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .try_init();
}

pub fn parse_framing(input: &str) -> Result<FramingMode, String> {
    FramingMode::parse(input).ok_or_else(|| format!("invalid framing: {input}"))
}

/// `big`/`be` (high word first) or `little`/`le`.
pub fn parse_word_order(input: &str) -> Result<WordOrder, String> {
    match input.trim().to_ascii_lowercase().as_str() {
        "big" | "be" => Ok(WordOrder::BigEndian),
        "little" | "le" => Ok(WordOrder::LittleEndian),
        _ => Err(format!("invalid word order: {input}")),
    }
}

pub fn parse_bool(input: &str) -> Result<bool, String> {
    match input.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        _ => Err(format!("invalid bool value: {input}")),
    }
}

#[cfg(test)]
mod tests {
    use super::{SerialConnectionArgs, parse_bool, parse_framing, parse_word_order};
    use clap::Parser;
    use serialmod_core::FramingMode;
    use serialmod_core::numeric::WordOrder;
    use serialmod_datalink::{Parity, StopBits};
    use std::time::Duration;

    #[derive(Debug, Parser)]
    struct Cli {
        #[command(flatten)]
        conn: SerialConnectionArgs,
    }

    #[test]
    fn parses_connection_flags() {
        let cli = Cli::try_parse_from([
            "tool",
            "--port",
            "/dev/ttyUSB0",
            "--baud",
            "19200",
            "--parity",
            "even",
            "--stop-bits",
            "2",
            "--framing",
            "ASCII",
            "--timeout",
            "250",
        ])
        .unwrap();

        let settings = cli.conn.settings();
        assert_eq!(settings.baud_rate, 19200);
        assert_eq!(settings.parity, Parity::Even);
        assert_eq!(settings.stop_bits, StopBits::Two);
        let config = cli.conn.config();
        assert_eq!(config.framing, FramingMode::Ascii);
        assert_eq!(config.timeout, Duration::from_millis(250));
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn rejects_unknown_parity() {
        assert!(Cli::try_parse_from(["tool", "--port", "COM3", "--parity", "mark"]).is_err());
    }

    #[test]
    fn parses_bools_and_framings() {
        assert_eq!(parse_bool(" On "), Ok(true));
        assert_eq!(parse_bool("0"), Ok(false));
        assert!(parse_bool("maybe").is_err());
        assert_eq!(parse_framing("rtu"), Ok(FramingMode::Rtu));
        assert!(parse_framing("tcp").is_err());
        assert_eq!(parse_word_order("LE"), Ok(WordOrder::LittleEndian));
        assert!(parse_word_order("middle").is_err());
    }
}
