//! Subcommand that parses an initialization segment and prints the stream
//! info the core extracted from it, without repackaging anything.

use base::{Error, ResultExt};
use bpaf::Bpaf;
use packager::isobmff::reader;
use std::path::PathBuf;

/// Parses an init segment and prints the stream info found in it.
#[derive(Bpaf, Debug)]
#[bpaf(command("probe"))]
pub struct Args {
    /// Initialization segment to inspect.
    #[bpaf(long, argument("PATH"))]
    init: PathBuf,
}

pub fn run(args: Args) -> Result<i32, Error> {
    let bytes = std::fs::read(&args.init).err_kind(base::ErrorKind::FileFailure)?;
    let parsed = reader::parse_init_segment(&bytes)?;
    println!("{:#?}", parsed.stream_info);
    Ok(0)
}
