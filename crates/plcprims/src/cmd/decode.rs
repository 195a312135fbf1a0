use plcprims_frame::{Frame, FrameLayout, FRAME_SIZE, SIZE_PREFIX_LEN};

use crate::cmd::{parse_hex, DecodeArgs};
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::{print_frame, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let bytes = parse_hex(&args.hex)?;
    let layout = if args.prefixed || bytes.len() == FRAME_SIZE + SIZE_PREFIX_LEN {
        FrameLayout::SizePrefixed
    } else {
        FrameLayout::Plain
    };

    let frame = Frame::from_wire(&bytes, layout).map_err(|err| frame_error("decode failed", err))?;
    print_frame(&frame, "-", format);
    Ok(SUCCESS)
}
