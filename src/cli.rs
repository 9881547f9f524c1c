//! Minimal CLI parsing for one-shot commands.

use std::env;

use anyhow::{Result, bail};

pub const USAGE: &str = "\
Usage: shelfkeeper [COMMAND]

Without a command, runs every enabled library on its schedule until Ctrl-C.

Commands:
  --scan <library>    Index one library now and exit
  --scan-all          Index every enabled library now and exit
  --list-duplicates   Print duplicate title folders awaiting review
  --help              Show this message";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Command {
    /// Scheduled indexing until interrupted
    #[default]
    Daemon,
    Scan(String),
    ScanAll,
    ListDuplicates,
    Help,
}

#[derive(Debug, Default)]
pub struct CliOptions {
    pub command: Command,
}

impl CliOptions {
    pub fn from_args() -> Result<Self> {
        Self::parse(env::args().skip(1))
    }

    /// Parse arguments (without the program name). The last command wins.
    pub fn parse<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut options = CliOptions::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--scan" => match args.next() {
                    Some(slug) if !slug.starts_with("--") => {
                        options.command = Command::Scan(slug);
                    }
                    _ => bail!("--scan requires a library slug"),
                },
                _ if arg.starts_with("--scan=") => {
                    match arg.split_once('=').map(|(_, v)| v) {
                        Some(slug) if !slug.is_empty() => {
                            options.command = Command::Scan(slug.to_string());
                        }
                        _ => bail!("--scan requires a library slug"),
                    }
                }
                "--scan-all" => options.command = Command::ScanAll,
                "--list-duplicates" => options.command = Command::ListDuplicates,
                "--help" | "-h" => options.command = Command::Help,
                other => bail!("Unknown argument: {other}\n\n{USAGE}"),
            }
        }
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Command> {
        CliOptions::parse(args.iter().map(|a| a.to_string())).map(|o| o.command)
    }

    #[test]
    fn test_no_arguments_is_daemon() {
        assert_eq!(parse(&[]).unwrap(), Command::Daemon);
    }

    #[test]
    fn test_commands() {
        assert_eq!(parse(&["--scan", "manga"]).unwrap(), Command::Scan("manga".into()));
        assert_eq!(parse(&["--scan=manga"]).unwrap(), Command::Scan("manga".into()));
        assert_eq!(parse(&["--scan-all"]).unwrap(), Command::ScanAll);
        assert_eq!(parse(&["--list-duplicates"]).unwrap(), Command::ListDuplicates);
        assert_eq!(parse(&["-h"]).unwrap(), Command::Help);
    }

    #[test]
    fn test_bad_arguments() {
        assert!(parse(&["--scan"]).is_err());
        assert!(parse(&["--scan", "--scan-all"]).is_err());
        assert!(parse(&["--scan="]).is_err());
        assert!(parse(&["--frobnicate"]).is_err());
    }
}
