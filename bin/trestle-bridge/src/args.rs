//! Parses command-line arguments for the relay CLI.

use std::path::PathBuf;

use clap::{crate_version, Parser};

#[derive(Debug, Parser)]
#[clap(
    name = "trestle-bridge",
    about = "The deposit relay node for the Trestle bridge",
    version = crate_version!()
)]
pub(crate) struct Cli {
    #[clap(
        long,
        short = 'p',
        help = "The file containing params for the bridge",
        default_value = "params.toml"
    )]
    pub params: PathBuf,

    #[clap(
        long,
        short = 'c',
        help = "The file containing the configuration for the bridge",
        default_value = "config.toml"
    )]
    pub config: PathBuf,
}
