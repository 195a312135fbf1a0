use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use plcprims_frame::{format_frame_timestamp, message::message_name, to_hex_string, Frame};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

const PREVIEW_BYTES: usize = 16;

#[derive(Serialize)]
struct FrameOutput<'a> {
    message_type: u8,
    message_name: &'a str,
    data_type: u8,
    data_start: u16,
    data_offset: u16,
    sequence: u8,
    retry: u8,
    timestamp: String,
    epoch_millis: Option<i64>,
    peer: &'a str,
    data: String,
}

impl<'a> FrameOutput<'a> {
    fn new(frame: &Frame, peer: &'a str) -> Self {
        Self {
            message_type: frame.message_id(),
            message_name: message_name(frame.message_id()),
            data_type: frame.data_type(),
            data_start: frame.data_start_number(),
            data_offset: frame.data_offset(),
            sequence: frame.sequence_number(),
            retry: frame.retry_count(),
            timestamp: format_frame_timestamp(frame),
            epoch_millis: frame.extract_timestamp_millis().ok(),
            peer,
            data: data_preview(frame.data()),
        }
    }
}

pub fn print_frame(frame: &Frame, peer: &str, format: OutputFormat) {
    let out = FrameOutput::new(frame, peer);
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["MESSAGE", "SEQ", "START", "OFFSET", "TIMESTAMP", "PEER", "DATA"])
                .add_row(vec![
                    format!("{} (0x{:02x})", out.message_name, out.message_type),
                    out.sequence.to_string(),
                    out.data_start.to_string(),
                    out.data_offset.to_string(),
                    out.timestamp.clone(),
                    peer.to_string(),
                    out.data.clone(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "msg={} (0x{:02x}) type={} start={} offset={} seq={} retry={} time=\"{}\" peer={} data={}",
                out.message_name,
                out.message_type,
                out.data_type,
                out.data_start,
                out.data_offset,
                out.sequence,
                out.retry,
                out.timestamp,
                peer,
                out.data
            );
        }
        OutputFormat::Raw => {
            print_raw(frame.as_bytes());
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

/// Hex dump of the used part of the data area, cut after a few bytes.
fn data_preview(data: &[u8]) -> String {
    let used = data.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
    if used == 0 {
        return "<empty>".to_string();
    }
    let shown = used.min(PREVIEW_BYTES);
    let mut preview = to_hex_string(&data[..shown]);
    if used > shown {
        preview.push_str(&format!(" ... ({used} bytes)"));
    }
    preview
}
