use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "stembox")]
#[command(about = "Submit media for stem separation, follow the job and fetch the result", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to $STEMBOX_CONFIG or config/stembox.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Backend base URL, overriding configuration
    #[arg(long, global = true)]
    pub backend: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Submit a file or URL, follow the job and download the stems
    Process(ProcessArgs),
    /// Follow an existing job until it is done
    Watch(WatchArgs),
    /// Download the stems of a finished job
    Download(DownloadArgs),
}

#[derive(Args, Debug)]
#[group(id = "source", required = true, multiple = false)]
pub struct SourceArgs {
    /// Local audio or video file to upload
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Remote video URL for the backend to fetch
    #[arg(long)]
    pub url: Option<String>,
}

#[derive(Args, Debug)]
pub struct ProcessArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Number of stems to extract
    #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(u8).range(2..=4))]
    pub stems: u8,

    /// Where to save the bundle (defaults to download.file_name)
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Stop once the job is done without downloading
    #[arg(long)]
    pub no_download: bool,
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    pub job_id: String,
}

#[derive(Args, Debug)]
pub struct DownloadArgs {
    pub job_id: String,

    #[arg(long, short)]
    pub output: Option<PathBuf>,
}
