//! Command-line parsing.

use std::path::PathBuf;

pub const USAGE: &str = "\
usage:
  seamtrack replay <points.txt> [--config <file>] [--out <file>]
  seamtrack monitor [--config <file>]
  seamtrack help";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the planner over an offline point file.
    Replay {
        input: PathBuf,
        config: Option<PathBuf>,
        out: Option<PathBuf>,
    },
    /// Connect to the controller and log its status until Ctrl-C.
    Monitor { config: Option<PathBuf> },
    Help,
}

/// Parse the arguments following the program name.
pub fn parse<I>(args: I) -> Result<Command, String>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let Some(sub) = args.next() else {
        return Ok(Command::Help);
    };

    let mut positional = Vec::new();
    let mut config = None;
    let mut out = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => config = Some(flag_value(&arg, args.next())?),
            "--out" | "-o" => out = Some(flag_value(&arg, args.next())?),
            flag if flag.starts_with('-') => return Err(format!("unknown option `{flag}`")),
            _ => positional.push(PathBuf::from(arg)),
        }
    }

    match sub.as_str() {
        "replay" => {
            let mut positional = positional.into_iter();
            let input = positional
                .next()
                .ok_or_else(|| "replay needs an input file".to_string())?;
            if let Some(extra) = positional.next() {
                return Err(format!("unexpected argument `{}`", extra.display()));
            }
            Ok(Command::Replay { input, config, out })
        }
        "monitor" => {
            if let Some(extra) = positional.first() {
                return Err(format!("unexpected argument `{}`", extra.display()));
            }
            if out.is_some() {
                return Err("monitor does not take --out".into());
            }
            Ok(Command::Monitor { config })
        }
        "help" | "--help" | "-h" => Ok(Command::Help),
        other => Err(format!("unknown command `{other}`")),
    }
}

fn flag_value(flag: &str, value: Option<String>) -> Result<PathBuf, String> {
    value
        .map(PathBuf::from)
        .ok_or_else(|| format!("`{flag}` needs a value"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(args: &[&str]) -> Result<Command, String> {
        parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn no_arguments_shows_help() {
        assert_eq!(parse_str(&[]).unwrap(), Command::Help);
        assert_eq!(parse_str(&["--help"]).unwrap(), Command::Help);
    }

    #[test]
    fn replay_with_options() {
        let cmd = parse_str(&["replay", "seam.txt", "--out", "smooth.txt", "-c", "cell.toml"]).unwrap();
        assert_eq!(
            cmd,
            Command::Replay {
                input: PathBuf::from("seam.txt"),
                config: Some(PathBuf::from("cell.toml")),
                out: Some(PathBuf::from("smooth.txt")),
            }
        );
    }

    #[test]
    fn replay_requires_input() {
        assert!(parse_str(&["replay"]).is_err());
        assert!(parse_str(&["replay", "a.txt", "b.txt"]).is_err());
    }

    #[test]
    fn monitor_takes_only_config() {
        assert_eq!(
            parse_str(&["monitor"]).unwrap(),
            Command::Monitor { config: None }
        );
        assert!(parse_str(&["monitor", "--out", "x"]).is_err());
        assert!(parse_str(&["monitor", "extra"]).is_err());
    }

    #[test]
    fn bad_input_is_reported() {
        assert!(parse_str(&["weld"]).is_err());
        assert!(parse_str(&["replay", "a.txt", "--verbose"]).is_err());
        assert!(parse_str(&["replay", "a.txt", "--config"]).is_err());
    }
}
