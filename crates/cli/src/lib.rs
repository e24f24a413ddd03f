#![deny(unsafe_code)]

//! # Overview
//!
//! Command-line front-ends for the two executables. `parpack` streams one
//! or more directory trees to stdout or to a TCP peer; `parunpack`
//! materialises a stream from stdin or from a single accepted TCP
//! connection.
//!
//! Both entry points take the argument iterator plus explicit output
//! handles, mirroring the process boundary without spawning one, so the
//! full surface is testable in-process. Exit codes follow the fixed
//! contract: 0 success, 1 argument error, 2 runtime failure.
//!
//! `-h` names a host on both commands, so clap's default help flag is
//! disabled and `--help` is wired up explicitly.

mod exit_code;
mod pack;
mod unpack;

pub use exit_code::ExitCode;
pub use pack::run_pack;
pub use unpack::run_unpack;

/// Initialises the stderr tracing subscriber, honouring `RUST_LOG`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}
