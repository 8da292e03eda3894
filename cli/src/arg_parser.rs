use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Talk to a container execution server
#[derive(Debug, Parser)]
#[clap(name = "exec-cli")]
pub struct ArgParser {
    /// Base URL of the server
    #[clap(
        short = 's',
        long = "server",
        env = "EXEC_SERVER",
        default_value = "http://127.0.0.1:8080"
    )]
    pub server: String,
    /// The sub-command to use
    #[clap(subcommand)]
    pub sub_command: SubCommand,
}

#[derive(Clone, Debug, PartialEq, Eq, Subcommand)]
pub enum SubCommand {
    /// run a command in a fresh container
    Exec {
        #[clap(long)]
        /// image to run, e.g. alpine:3.19
        image: String,

        #[clap(long, parse(from_os_str))]
        /// directory whose contents are staged into the workspace
        input: Option<PathBuf>,

        #[clap(long, parse(from_os_str))]
        /// directory to extract the final workspace into
        output: Option<PathBuf>,

        #[clap(long)]
        /// send one JSON document with base64 data instead of multipart
        inline: bool,

        #[clap(last = true, required = true)]
        /// the command and its arguments, after `--`
        command: Vec<String>,
    },
    /// mean cpu usage of the server host
    Cpu,
    /// memory usage of the server host
    Memory,
    /// one minute load average of the server host
    Load,
    /// check the server is up
    Health,
    /// list jobs in flight
    Jobs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_takes_the_command_after_double_dash() {
        let args = ArgParser::try_parse_from([
            "exec-cli",
            "--server",
            "http://exec.local:8080",
            "exec",
            "--image",
            "alpine",
            "--input",
            "./in",
            "--",
            "sh",
            "-c",
            "ls -l > out.txt",
        ])
        .unwrap();

        assert_eq!(args.server, "http://exec.local:8080");
        assert_eq!(
            args.sub_command,
            SubCommand::Exec {
                image: "alpine".into(),
                input: Some(PathBuf::from("./in")),
                output: None,
                inline: false,
                command: vec!["sh".into(), "-c".into(), "ls -l > out.txt".into()],
            }
        );
    }

    #[test]
    fn exec_requires_a_command() {
        assert!(ArgParser::try_parse_from(["exec-cli", "exec", "--image", "alpine"]).is_err());
    }

    #[test]
    fn status_commands_take_no_arguments() {
        let args = ArgParser::try_parse_from(["exec-cli", "load"]).unwrap();
        assert_eq!(args.sub_command, SubCommand::Load);
    }
}
