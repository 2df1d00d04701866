use clap::error::ErrorKind;
use clap::Parser;

const EXAMPLES: &str = "\
Examples:
  gputemps                Display and update table of GPU temperatures
  gputemps --json         Continuously output GPU temperatures in JSON format
  gputemps --once         Output temperatures once in table format
  gputemps --json --once  Output temperatures once in JSON format";

#[derive(Parser, Debug)]
#[command(name = "gputemps")]
#[command(about = "Core, junction and VRAM temperatures of NVIDIA GPUs", long_about = None)]
#[command(version, after_help = EXAMPLES)]
pub struct Cli {
    /// Output temperatures in JSON format
    #[arg(long)]
    pub json: bool,

    /// Output temperatures once
    #[arg(long)]
    pub once: bool,
}

/// What to print on stderr, and the exit status, when parsing stops early.
/// Help and version are not failures; anything else is.
pub fn rejection(err: &clap::Error) -> (String, u8) {
    let status = match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => 1,
    };
    (err.render().to_string(), status)
}
