#![deny(unsafe_code)]

use std::io::{Read, Write};
use std::process::ExitCode;
use std::{env, io};

fn main() -> ExitCode {
    cli::init_logging();
    let mut stdin = io::stdin().lock();
    let mut stdout = io::stdout().lock();
    let mut stderr = io::stderr().lock();
    run_with(env::args_os(), &mut stdin, &mut stdout, &mut stderr)
}

fn run_with<I, In, Out, Err>(args: I, input: &mut In, stdout: &mut Out, stderr: &mut Err) -> ExitCode
where
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
    In: Read,
    Out: Write,
    Err: Write,
{
    cli::run_unpack(args, input, stdout, stderr).into()
}

#[cfg(test)]
mod tests {
    use super::run_with;
    use std::io;
    use std::process::ExitCode;

    #[test]
    fn usage_error_reports_syntax_exit() {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let exit = run_with(["parunpack"], &mut io::empty(), &mut stdout, &mut stderr);
        assert_eq!(exit, ExitCode::from(1));
        assert!(!stderr.is_empty(), "usage should be printed to stderr");
    }
}
