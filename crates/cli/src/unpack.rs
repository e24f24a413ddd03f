//! The `parunpack` front-end.

use std::ffi::OsString;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use archive::{Unpacker, VerbosePrinter, net};
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use posix_fs::LocalFs;
use protocol::DEFAULT_PORT;

use crate::exit_code::ExitCode;
use crate::pack::dispatch_clap_error;

pub(crate) fn command() -> Command {
    Command::new("parunpack")
        .about("Unpacks a ParallelPack stream into an existing directory")
        .disable_help_flag(true)
        .arg(
            Arg::new("help")
                .long("help")
                .action(ArgAction::Help)
                .help("Print help"),
        )
        .arg(
            Arg::new("listen")
                .short('l')
                .action(ArgAction::SetTrue)
                .help("Listen on TCP for exactly one pack connection instead of reading stdin"),
        )
        .arg(
            Arg::new("host")
                .short('h')
                .value_name("HOST")
                .help("Interface to bind for -l (default all interfaces)"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .value_name("PORT")
                .value_parser(value_parser!(u16))
                .help("TCP port for -l (default 10000)"),
        )
        .arg(
            Arg::new("dry-run")
                .short('n')
                .action(ArgAction::SetTrue)
                .help("Consume the stream without writing anything"),
        )
        .arg(
            Arg::new("force")
                .short('f')
                .action(ArgAction::SetTrue)
                .help("Overwrite existing files"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .action(ArgAction::SetTrue)
                .help("Report each unpacked path on stderr"),
        )
        .arg(
            Arg::new("dedup")
                .short('d')
                .value_name("ROOT")
                .value_parser(value_parser!(PathBuf))
                .help("Deduplicate file data through the store rooted at ROOT"),
        )
        .arg(
            Arg::new("path")
                .value_name("PATH")
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .help("Existing directory to unpack into"),
        )
}

/// Runs `parunpack` with explicit argument, input, and output handles.
///
/// `input` is consumed only in the default stdin mode; with `-l` the stream
/// arrives over the accepted TCP connection instead.
pub fn run_unpack<I, T, In, Out, Err>(
    args: I,
    input: &mut In,
    stdout: &mut Out,
    stderr: &mut Err,
) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    In: Read,
    Out: Write,
    Err: Write,
{
    let matches = match command().try_get_matches_from(args) {
        Ok(matches) => matches,
        Err(error) => return dispatch_clap_error(&error, stdout, stderr),
    };

    match execute(&matches, input) {
        Ok(()) => ExitCode::Ok,
        Err(error) => {
            let _ = writeln!(stderr, "parunpack: {error}");
            ExitCode::Runtime
        }
    }
}

fn execute<In: Read>(matches: &ArgMatches, input: &mut In) -> Result<(), archive::ArchiveError> {
    let dest = matches
        .get_one::<PathBuf>("path")
        .expect("path is required")
        .clone();
    let port = matches
        .get_one::<u16>("port")
        .copied()
        .unwrap_or(DEFAULT_PORT);

    let index = match matches.get_one::<PathBuf>("dedup") {
        Some(root) => Some(dedup::index_for(Arc::new(LocalFs), root)?),
        None => None,
    };

    let printer = matches
        .get_flag("verbose")
        .then(VerbosePrinter::stderr);
    let mut unpacker = Unpacker::new(&LocalFs)
        .force(matches.get_flag("force"))
        .dry_run(matches.get_flag("dry-run"));
    if let Some(printer) = printer.as_ref() {
        unpacker = unpacker.verbose(printer);
    }
    if let Some(index) = index {
        unpacker = unpacker.dedup_index(index);
    }

    let result = if matches.get_flag("listen") {
        let bind = matches
            .get_one::<String>("host")
            .map_or("0.0.0.0", String::as_str);
        net::unpack_listen(&unpacker, &dest, bind, port)
    } else {
        unpacker.unpack(&mut *input, &dest)
    };

    if let Some(printer) = printer {
        let _ = printer.finish();
    }
    result
}
