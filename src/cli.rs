// Command-line surface
//
// The exit-code contract is stricter than what an argument-parsing crate
// gives us (-1 on anything unrecognized), so the handful of flags is matched
// by hand. Running with no arguments selects the best-scoring adapter
// automatically.

use std::fmt;

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    /// Run the reproduction, optionally pinned to one adapter index.
    Run { device: Option<usize> },
    /// Print `"<id> : <name>"` for every adapter and exit.
    ListDevices,
    /// Print usage text and exit.
    Help,
}

#[derive(Debug, PartialEq, Eq)]
pub struct UsageError(pub String);

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub const USAGE: &str = "\
export-handle-probe - reproduce aliased exported memory handles for small pooled images

Usage: export-handle-probe [OPTIONS]

Options:
  -d, --device <id>    Use the adapter at this enumeration index
  -l, --list-devices   List adapters as \"<id> : <name>\" and exit
  -h, --help           Show this help

Without options the best-scoring adapter is selected automatically.";

pub fn parse(args: &[String]) -> Result<Command, UsageError> {
    let mut device = None;
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(Command::Help),
            "--list-devices" | "-l" => return Ok(Command::ListDevices),
            "--device" | "-d" => {
                let value = iter
                    .next()
                    .ok_or_else(|| UsageError(format!("{arg} expects an adapter index")))?;
                let index = value
                    .parse::<usize>()
                    .map_err(|_| UsageError(format!("invalid adapter index '{value}'")))?;
                device = Some(index);
            }
            other => return Err(UsageError(format!("unrecognized argument '{other}'"))),
        }
    }

    Ok(Command::Run { device })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_strs(args: &[&str]) -> Result<Command, UsageError> {
        let owned: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        parse(&owned)
    }

    #[test]
    fn no_arguments_means_automatic_selection() {
        assert_eq!(parse_strs(&[]), Ok(Command::Run { device: None }));
    }

    #[test]
    fn device_flag_pins_an_adapter_index() {
        assert_eq!(
            parse_strs(&["--device", "2"]),
            Ok(Command::Run { device: Some(2) })
        );
        assert_eq!(
            parse_strs(&["-d", "0"]),
            Ok(Command::Run { device: Some(0) })
        );
    }

    #[test]
    fn listing_and_help_have_short_and_long_spellings() {
        assert_eq!(parse_strs(&["--list-devices"]), Ok(Command::ListDevices));
        assert_eq!(parse_strs(&["-l"]), Ok(Command::ListDevices));
        assert_eq!(parse_strs(&["--help"]), Ok(Command::Help));
        assert_eq!(parse_strs(&["-h"]), Ok(Command::Help));
    }

    #[test]
    fn device_flag_requires_a_numeric_value() {
        assert!(parse_strs(&["--device"]).is_err());
        assert!(parse_strs(&["-d", "not-a-number"]).is_err());
        assert!(parse_strs(&["-d", "-1"]).is_err());
    }

    #[test]
    fn unknown_arguments_are_usage_errors() {
        assert!(parse_strs(&["--frobnicate"]).is_err());
        assert!(parse_strs(&["extra"]).is_err());
        assert!(parse_strs(&["-d", "1", "junk"]).is_err());
    }
}
