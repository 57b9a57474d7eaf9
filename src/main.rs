use base::Error;
use bpaf::{Bpaf, Parser};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

mod cmds;

// Either set in the environment when `cargo` is invoked, or from within `build.rs`.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// live-packager: repackages encoded media segments into the container and
/// protection scheme a streaming client needs.
#[derive(Bpaf, Debug)]
#[bpaf(options, version(VERSION))]
enum Args {
    Package(#[bpaf(external(cmds::package::args))] cmds::package::Args),
    Probe(#[bpaf(external(cmds::probe::args))] cmds::probe::Args),
}

impl Args {
    fn run(self) -> Result<i32, Error> {
        match self {
            Args::Package(a) => cmds::package::run(a),
            Args::Probe(a) => cmds::probe::run(a),
        }
    }
}

fn main() {
    base::tracing_setup::install();

    // Get the program name from the OS (e.g. if invoked as `target/debug/live-packager`:
    // `live-packager`), falling back to the crate name if conversion to a path/UTF-8 string
    // fails. `bpaf`'s default logic is similar but doesn't have the fallback.
    let progname = std::env::args_os().next().map(PathBuf::from);
    let progname = progname
        .as_deref()
        .and_then(Path::file_name)
        .and_then(OsStr::to_str)
        .unwrap_or(env!("CARGO_PKG_NAME"));

    let args = match args()
        .fallback_to_usage()
        .run_inner(bpaf::Args::current_args().set_name(progname))
    {
        Ok(a) => a,
        Err(e) => std::process::exit(e.exit_code()),
    };
    tracing::trace!("parsed command-line arguments: {args:#?}");

    match args.run() {
        Err(e) => {
            error!(err = %e, "exiting due to error");
            std::process::exit(1);
        }
        Ok(rv) => {
            debug!("exiting with status {}", rv);
            std::process::exit(rv)
        }
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn bpaf_invariants() {
        super::args().check_invariants(false);
    }
}
