use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use plcprims_frame::message::message_name;
use plcprims_transport::{
    ConnectionParameters, DirectFramingTransport, PlcDriver, SegmentedConfig, SegmentedTransport,
};

use crate::exit::{io_error, transport_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect to a PLC, send one frame and optionally wait for the reply.
    Send(SendArgs),
    /// Act as a PLC: accept one connection and print received frames.
    Listen(ListenArgs),
    /// Decode a hex frame dump.
    Decode(DecodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// PLC wire family.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Family {
    /// Frame with 2-byte size prefix over plain TCP.
    Direct,
    /// ISO-on-TCP (RFC 1006).
    Iso,
}

impl Family {
    pub fn default_port(self) -> u16 {
        match self {
            Family::Direct => 502,
            Family::Iso => 102,
        }
    }
}

#[derive(Args, Debug)]
pub struct ConnectionArgs {
    /// PLC wire family.
    #[arg(long, value_enum, default_value = "iso", env = "PLCPRIMS_FAMILY")]
    pub family: Family,
    /// TCP port (default: 502 direct, 102 iso).
    #[arg(long, env = "PLCPRIMS_PORT")]
    pub port: Option<u16>,
    /// Local TSAP (iso only, up to 8 characters).
    #[arg(long, value_name = "TSAP", env = "PLCPRIMS_SRC_TSAP")]
    pub src_tsap: Option<String>,
    /// Remote TSAP (iso only, up to 8 characters).
    #[arg(long, value_name = "TSAP", env = "PLCPRIMS_DST_TSAP")]
    pub dst_tsap: Option<String>,
    /// Send a disconnect request before closing (iso only).
    #[arg(long)]
    pub shutdown: bool,
    /// JSON file with connection parameters; flags override its values.
    #[arg(long, value_name = "FILE", env = "PLCPRIMS_PROFILE")]
    pub profile: Option<PathBuf>,
    /// Largest ISO-on-TCP packet, headers included.
    #[arg(long, default_value_t = 65535)]
    pub max_packet_size: usize,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// PLC host name or address (may come from --profile instead).
    pub host: Option<String>,
    #[command(flatten)]
    pub connection: ConnectionArgs,
    /// Message type, by name (BOOL_DATA) or number (7, 0x07).
    #[arg(long, default_value = "GET_ALL_DATA", value_parser = parse_message_type)]
    pub msg_type: u8,
    /// Data type byte.
    #[arg(long, default_value_t = 0)]
    pub data_type: u8,
    /// Data-start number.
    #[arg(long, default_value_t = 0)]
    pub data_start: u16,
    /// Data offset.
    #[arg(long, default_value_t = 0)]
    pub data_offset: u16,
    /// Data area bytes as hex (e.g. "01 02 ff" or "0x01 0x02").
    #[arg(long, value_name = "HEX")]
    pub data: Option<String>,
    /// Sequence number to use instead of the next free one.
    #[arg(long)]
    pub seq: Option<u8>,
    /// Align the send to the next second boundary (blocks about one second).
    #[arg(long)]
    pub sync: bool,
    /// Wait for one reply frame and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for the reply when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Address to bind (e.g. 127.0.0.1:1102).
    pub addr: String,
    /// PLC wire family.
    #[arg(long, value_enum, default_value = "iso", env = "PLCPRIMS_FAMILY")]
    pub family: Family,
    /// Largest ISO-on-TCP packet, headers included.
    #[arg(long, default_value_t = 65535)]
    pub max_packet_size: usize,
    /// Answer every received frame with an ACK carrying its sequence number.
    #[arg(long)]
    pub ack: bool,
    /// Exit after receiving N frames.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Frame bytes as hex; spaces and 0x prefixes are ignored.
    pub hex: String,
    /// Treat the dump as carrying the 2-byte size prefix (detected for 242-byte dumps).
    #[arg(long)]
    pub prefixed: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Merge the optional JSON profile with command-line values.
pub fn resolve_params(host: Option<&str>, args: &ConnectionArgs) -> CliResult<ConnectionParameters> {
    let mut params = match &args.profile {
        Some(path) => {
            let text = fs::read_to_string(path)
                .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
            serde_json::from_str::<ConnectionParameters>(&text).map_err(|err| {
                CliError::new(USAGE, format!("invalid profile {}: {err}", path.display()))
            })?
        }
        None => {
            let host = host.ok_or_else(|| CliError::new(USAGE, "a host or --profile is required"))?;
            ConnectionParameters::new(host, args.family.default_port())
        }
    };

    if let Some(host) = host {
        params.host = host.to_string();
    }
    if let Some(port) = args.port {
        params.port = port;
    }
    if let Some(tsap) = &args.src_tsap {
        params.source_tsap = tsap.clone();
    }
    if let Some(tsap) = &args.dst_tsap {
        params.destination_tsap = tsap.clone();
    }
    params.shutdown |= args.shutdown;

    params
        .validate()
        .map_err(|err| transport_error("invalid connection parameters", err))?;
    Ok(params)
}

pub fn build_driver(family: Family, max_packet_size: usize) -> CliResult<Box<dyn PlcDriver>> {
    match family {
        Family::Direct => Ok(Box::new(DirectFramingTransport::new())),
        Family::Iso => {
            let driver = SegmentedTransport::with_config(iso_config(max_packet_size))
                .map_err(|err| transport_error("invalid transport settings", err))?;
            Ok(Box::new(driver))
        }
    }
}

pub fn iso_config(max_packet_size: usize) -> SegmentedConfig {
    SegmentedConfig {
        max_packet_size,
        ..SegmentedConfig::default()
    }
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

/// Parse a hex dump such as `"00 f0 24"`, `"0x00 0xf0"` or `"00f024"`.
pub fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let digits: String = input
        .split(|c: char| c.is_whitespace() || c == ',' || c == ':')
        .map(|token| {
            token
                .strip_prefix("0x")
                .or_else(|| token.strip_prefix("0X"))
                .unwrap_or(token)
        })
        .collect();

    if !digits.is_ascii() {
        return Err(CliError::new(USAGE, "hex input contains non-hex characters"));
    }
    if digits.len() % 2 != 0 {
        return Err(CliError::new(USAGE, "hex input has an odd number of digits"));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| CliError::new(USAGE, format!("invalid hex byte: {}", &digits[i..i + 2])))
        })
        .collect()
}

fn parse_message_type(input: &str) -> Result<u8, String> {
    let input = input.trim();
    if let Some(hex) = input.strip_prefix("0x").or_else(|| input.strip_prefix("0X")) {
        return u8::from_str_radix(hex, 16).map_err(|err| err.to_string());
    }
    if let Ok(value) = input.parse::<u8>() {
        return Ok(value);
    }
    let wanted = input.to_ascii_uppercase();
    (0..=u8::MAX)
        .find(|id| message_name(*id) == wanted && wanted != "UNKNOWN")
        .ok_or_else(|| format!("unknown message type: {input}"))
}
