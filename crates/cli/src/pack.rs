//! The `parpack` front-end.

use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use archive::{Packer, VerbosePrinter, net};
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use posix_fs::LocalFs;
use protocol::DEFAULT_PORT;

use crate::exit_code::ExitCode;

pub(crate) fn command() -> Command {
    Command::new("parpack")
        .about("Packs one or more directory trees into a single ParallelPack stream")
        .disable_help_flag(true)
        .arg(
            Arg::new("help")
                .long("help")
                .action(ArgAction::Help)
                .help("Print help"),
        )
        .arg(
            Arg::new("host")
                .short('h')
                .value_name("HOST")
                .help("Connect to HOST over TCP instead of writing to stdout"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .value_name("PORT")
                .value_parser(value_parser!(u16))
                .help("TCP port for -h (default 10000)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .action(ArgAction::SetTrue)
                .help("Report each packed path on stderr"),
        )
        .arg(
            Arg::new("compress")
                .short('z')
                .action(ArgAction::SetTrue)
                .help("Compress the stream with gzip"),
        )
        .arg(
            Arg::new("dedup")
                .short('d')
                .value_name("ROOT")
                .value_parser(value_parser!(PathBuf))
                .help("Sources live in the deduplicating store rooted at ROOT"),
        )
        .arg(
            Arg::new("path")
                .value_name("PATH")
                .num_args(1..)
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .help("Source directories to pack"),
        )
}

pub(crate) fn dispatch_clap_error<Out, Err>(
    error: &clap::Error,
    stdout: &mut Out,
    stderr: &mut Err,
) -> ExitCode
where
    Out: Write,
    Err: Write,
{
    let rendered = error.render();
    if matches!(
        error.kind(),
        clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
    ) {
        let _ = write!(stdout, "{rendered}");
        ExitCode::Ok
    } else {
        let _ = write!(stderr, "{rendered}");
        ExitCode::Syntax
    }
}

/// Runs `parpack` with explicit argument and output handles.
pub fn run_pack<I, T, Out, Err>(args: I, stdout: &mut Out, stderr: &mut Err) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    Out: Write,
    Err: Write,
{
    let matches = match command().try_get_matches_from(args) {
        Ok(matches) => matches,
        Err(error) => return dispatch_clap_error(&error, stdout, stderr),
    };

    match execute(&matches, stdout) {
        Ok(()) => ExitCode::Ok,
        Err(error) => {
            let _ = writeln!(stderr, "parpack: {error}");
            ExitCode::Runtime
        }
    }
}

fn execute<Out: Write>(matches: &ArgMatches, stdout: &mut Out) -> Result<(), archive::ArchiveError> {
    let sources: Vec<PathBuf> = matches
        .get_many::<PathBuf>("path")
        .expect("path is required")
        .cloned()
        .collect();
    let port = matches
        .get_one::<u16>("port")
        .copied()
        .unwrap_or(DEFAULT_PORT);

    // A dedup source tree is packed like any other: chunks are ordinary
    // hard-linked files. Opening the registry entry up front validates the
    // root before any bytes travel.
    if let Some(root) = matches.get_one::<PathBuf>("dedup") {
        dedup::index_for(Arc::new(LocalFs), root)?;
    }

    let printer = matches
        .get_flag("verbose")
        .then(VerbosePrinter::stderr);
    let mut packer = Packer::new(&LocalFs).compress(matches.get_flag("compress"));
    if let Some(printer) = printer.as_ref() {
        packer = packer.verbose(printer);
    }

    let result = match matches.get_one::<String>("host") {
        Some(host) => net::pack_to_host(&packer, &sources, host, port),
        None => packer.pack(&sources, &mut *stdout),
    };

    if let Some(printer) = printer {
        let _ = printer.finish();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn short_h_is_host_not_help() {
        let matches = command()
            .try_get_matches_from(["parpack", "-h", "peer.example", "/tree"])
            .expect("parse");
        assert_eq!(
            matches.get_one::<String>("host").map(String::as_str),
            Some("peer.example")
        );
    }

    #[test]
    fn missing_path_is_a_usage_error() {
        let err = command()
            .try_get_matches_from(["parpack"])
            .expect_err("path required");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn double_dash_ends_option_parsing() {
        let matches = command()
            .try_get_matches_from(["parpack", "-z", "--", "-weird-dir"])
            .expect("parse");
        let paths: Vec<&PathBuf> = matches
            .get_many::<PathBuf>("path")
            .expect("paths")
            .collect();
        assert_eq!(paths, [&PathBuf::from("-weird-dir")]);
    }

    #[test]
    fn bad_port_is_a_usage_error() {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let code = run_pack(
            ["parpack", "-p", "not-a-port", "/tree"],
            &mut stdout,
            &mut stderr,
        );
        assert_eq!(code, ExitCode::Syntax);
        assert!(!stderr.is_empty());
    }

    #[test]
    fn missing_source_is_a_runtime_error() {
        let temp = tempfile::tempdir().expect("create tempdir");
        let ghost = temp.path().join("ghost");
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let code = run_pack(
            ["parpack".into(), ghost.into_os_string()],
            &mut stdout,
            &mut stderr,
        );
        assert_eq!(code, ExitCode::Runtime);
        assert!(String::from_utf8_lossy(&stderr).starts_with("parpack: "));
    }

    #[test]
    fn pack_writes_a_stream_to_stdout() {
        let temp = tempfile::tempdir().expect("create tempdir");
        let src = temp.path().join("tree");
        fs::create_dir(&src).expect("mkdir");
        fs::write(src.join("file"), b"bytes").expect("write");

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let code = run_pack(
            ["parpack".into(), src.into_os_string()],
            &mut stdout,
            &mut stderr,
        );
        assert_eq!(code, ExitCode::Ok);
        assert!(stdout.starts_with(b"ParallelPack"));
    }

    #[test]
    fn help_prints_to_stdout_and_succeeds() {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let code = run_pack(["parpack", "--help"], &mut stdout, &mut stderr);
        assert_eq!(code, ExitCode::Ok);
        assert!(!stdout.is_empty());
        assert!(stderr.is_empty());
    }
}
