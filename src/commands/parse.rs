//! Line command parser for the interactive front end

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::router::Operation;
use crate::sftp::path_utils::remote_file_name;

/// One parsed input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Empty,
    Connect,
    Disconnect,
    Pwd,
    Ls(Option<String>),
    Cd(String),
    Get { remote: String, local: Option<String> },
    Put { local: String, remote: Option<String> },
    Mkdir(String),
    Rm(String),
    Rmdir(String),
    Mv { from: String, to: String },
    Stat(String),
    Exec(String),
    SysInfo,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown command `{0}`; type `help` for a list")]
    UnknownCommand(String),

    #[error("`{command}` needs {argument}")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },

    #[error("`{0}` takes fewer arguments; quote names that contain spaces")]
    TooManyArguments(&'static str),

    #[error("unterminated quote")]
    UnterminatedQuote,
}

pub const HELP: &str = "\
Commands:
  connect                 connect with the command-line settings
  disconnect              close the connection
  pwd                     print the remote working directory
  ls [path]               list a directory
  cd <path>               change directory (`..` for the parent)
  get <remote> [local]    download a file
  put <local> [remote]    upload a file
  mkdir <name>            create a directory
  rm <name>               delete a file
  rmdir <name>            delete an empty directory
  mv <old> <new>          rename
  stat <name>             show properties
  exec <command>, !<cmd>  run a remote command
  sysinfo                 show remote system information
  help                    this text
  quit                    disconnect and exit
Names containing spaces can be quoted with \"...\" or '...'.";

/// Parse one input line
pub fn parse_line(line: &str) -> Result<Command, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Command::Empty);
    }

    // Remote commands are passed through untouched
    if let Some(rest) = line.strip_prefix('!') {
        return exec_command(rest);
    }
    let (keyword, rest) = line
        .split_once(char::is_whitespace)
        .unwrap_or((line, ""));
    if keyword == "exec" {
        return exec_command(rest);
    }

    let args = split_args(rest)?;
    let command = match keyword {
        "connect" => no_args("connect", &args, Command::Connect)?,
        "disconnect" => no_args("disconnect", &args, Command::Disconnect)?,
        "pwd" => no_args("pwd", &args, Command::Pwd)?,
        "sysinfo" => no_args("sysinfo", &args, Command::SysInfo)?,
        "help" | "?" => Command::Help,
        "quit" | "exit" => no_args("quit", &args, Command::Quit)?,
        "ls" => Command::Ls(at_most_one("ls", args)?),
        "cd" => Command::Cd(exactly_one("cd", "a path", args)?),
        "mkdir" => Command::Mkdir(exactly_one("mkdir", "a name", args)?),
        "rm" => Command::Rm(exactly_one("rm", "a name", args)?),
        "rmdir" => Command::Rmdir(exactly_one("rmdir", "a name", args)?),
        "stat" => Command::Stat(exactly_one("stat", "a name", args)?),
        "get" => {
            let (remote, local) = one_or_two("get", "a remote file", args)?;
            Command::Get { remote, local }
        }
        "put" => {
            let (local, remote) = one_or_two("put", "a local file", args)?;
            Command::Put { local, remote }
        }
        "mv" => match one_or_two("mv", "an old and a new name", args)? {
            (from, Some(to)) => Command::Mv { from, to },
            (_, None) => {
                return Err(ParseError::MissingArgument {
                    command: "mv",
                    argument: "an old and a new name",
                })
            }
        },
        other => return Err(ParseError::UnknownCommand(other.to_string())),
    };
    Ok(command)
}

impl Command {
    /// The session operation behind this command, if it has one
    pub fn to_operation(&self) -> Option<Operation> {
        let operation = match self {
            Command::Disconnect => Operation::Disconnect,
            Command::Ls(path) => Operation::ListDirectory { path: path.clone() },
            Command::Cd(path) => Operation::ChangeDirectory { path: path.clone() },
            Command::Get { remote, local } => Operation::Download {
                remote: remote.clone(),
                local: local
                    .as_ref()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(remote_file_name(remote))),
            },
            Command::Put { local, remote } => Operation::Upload {
                local: PathBuf::from(local),
                remote: remote.clone().unwrap_or_else(|| local_file_name(local)),
            },
            Command::Mkdir(name) => Operation::MakeDirectory { name: name.clone() },
            Command::Rm(name) => Operation::Remove {
                name: name.clone(),
                is_directory: false,
            },
            Command::Rmdir(name) => Operation::Remove {
                name: name.clone(),
                is_directory: true,
            },
            Command::Mv { from, to } => Operation::Rename {
                from: from.clone(),
                to: to.clone(),
            },
            Command::Stat(name) => Operation::Stat { name: name.clone() },
            Command::Exec(command) => Operation::Execute {
                command: command.clone(),
            },
            Command::SysInfo => Operation::SystemInfo,
            Command::Empty
            | Command::Connect
            | Command::Pwd
            | Command::Help
            | Command::Quit => return None,
        };
        Some(operation)
    }
}

fn local_file_name(local: &str) -> String {
    Path::new(local)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| local.to_string())
}

fn exec_command(rest: &str) -> Result<Command, ParseError> {
    let command = rest.trim();
    if command.is_empty() {
        return Err(ParseError::MissingArgument {
            command: "exec",
            argument: "a command",
        });
    }
    Ok(Command::Exec(command.to_string()))
}

fn no_args(name: &'static str, args: &[String], command: Command) -> Result<Command, ParseError> {
    if args.is_empty() {
        Ok(command)
    } else {
        Err(ParseError::TooManyArguments(name))
    }
}

fn at_most_one(name: &'static str, args: Vec<String>) -> Result<Option<String>, ParseError> {
    let mut args = args.into_iter();
    let first = args.next();
    if args.next().is_some() {
        return Err(ParseError::TooManyArguments(name));
    }
    Ok(first)
}

fn exactly_one(
    name: &'static str,
    argument: &'static str,
    args: Vec<String>,
) -> Result<String, ParseError> {
    at_most_one(name, args)?.ok_or(ParseError::MissingArgument {
        command: name,
        argument,
    })
}

fn one_or_two(
    name: &'static str,
    argument: &'static str,
    args: Vec<String>,
) -> Result<(String, Option<String>), ParseError> {
    let mut args = args.into_iter();
    let first = args.next().ok_or(ParseError::MissingArgument {
        command: name,
        argument,
    })?;
    let second = args.next();
    if args.next().is_some() {
        return Err(ParseError::TooManyArguments(name));
    }
    Ok((first, second))
}

/// Split on whitespace, honoring `"..."` (with `\` escapes) and `'...'`
pub fn split_args(input: &str) -> Result<Vec<String>, ParseError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_arg = false;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                in_arg = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(escaped) => current.push(escaped),
                            None => return Err(ParseError::UnterminatedQuote),
                        },
                        Some(other) => current.push(other),
                        None => return Err(ParseError::UnterminatedQuote),
                    }
                }
            }
            '\'' => {
                in_arg = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(other) => current.push(other),
                        None => return Err(ParseError::UnterminatedQuote),
                    }
                }
            }
            c if c.is_whitespace() => {
                if in_arg {
                    args.push(std::mem::take(&mut current));
                    in_arg = false;
                }
            }
            other => {
                in_arg = true;
                current.push(other);
            }
        }
    }
    if in_arg {
        args.push(current);
    }
    Ok(args)
}
