use chrono::Local;
use plcprims_frame::message::is_acknowledgement;
use plcprims_frame::Frame;
use plcprims_transport::{ConnectionParameters, PlcDriver};
use tracing::{debug, warn};

use crate::cmd::{build_driver, parse_duration, parse_hex, resolve_params, SendArgs};
use crate::exit::{frame_error, transport_error, CliResult, SUCCESS};
use crate::output::{print_frame, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let params = resolve_params(args.host.as_deref(), &args.connection)?;
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let driver = build_driver(args.connection.family, args.connection.max_packet_size)?;

    let mut frame = build_frame(&args, driver.as_ref())?;

    driver
        .connect(&params)
        .map_err(|err| transport_error("connect failed", err))?;

    let result = exchange(&args, driver.as_ref(), &params, &mut frame, wait_timeout, format);

    if let Err(err) = driver.disconnect(&params) {
        warn!(error = %err, "disconnect failed");
    }
    result
}

fn build_frame(args: &SendArgs, driver: &dyn PlcDriver) -> CliResult<Frame> {
    let mut frame = driver.new_frame(args.msg_type);
    frame.set_data_type(args.data_type);
    frame.set_data_start_number(args.data_start);
    frame.set_data_offset(args.data_offset);

    if let Some(hex) = &args.data {
        let bytes = parse_hex(hex)?;
        frame
            .append_bytes(&bytes, 0, bytes.len())
            .map_err(|err| frame_error("invalid --data", err))?;
    }

    match args.seq {
        Some(id) => driver.sequences().assign(&mut frame, id),
        None => {
            driver
                .sequences()
                .allocate(&mut frame)
                .map_err(|err| frame_error("no sequence number available", err))?;
        }
    }
    Ok(frame)
}

fn exchange(
    args: &SendArgs,
    driver: &dyn PlcDriver,
    params: &ConnectionParameters,
    frame: &mut Frame,
    wait_timeout: std::time::Duration,
    format: OutputFormat,
) -> CliResult<i32> {
    if args.sync {
        frame.set_synchronized_clock();
    } else {
        frame.set_timestamp(&Local::now());
    }

    driver
        .send(frame)
        .map_err(|err| transport_error("send failed", err))?;
    debug!(seq = frame.sequence_number(), "frame sent");

    if !args.wait {
        return Ok(SUCCESS);
    }

    let mut reply = driver.new_frame(0);
    driver
        .receive(&mut reply, Some(wait_timeout))
        .map_err(|err| transport_error("receive failed", err))?;

    if is_acknowledgement(reply.message_id()) {
        driver.sequences().free(u16::from(reply.sequence_number()));
    }
    print_frame(&reply, &params.address(), format);
    Ok(SUCCESS)
}
