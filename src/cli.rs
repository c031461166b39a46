use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "ytclip",
    version,
    about = "Download audio as trimmed MP3s",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
    #[command(flatten)]
    pub download: DownloadArgs,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download a video or playlist and trim each file as it lands.
    Download(DownloadArgs),
    /// Trim an already downloaded collection folder.
    Trim(TrimArgs),
    /// Print the effective configuration.
    Config,
}

#[derive(Parser, Debug, Clone, Default)]
pub struct DownloadArgs {
    /// Video ID, playlist ID or URL.
    #[arg(long, visible_alias = "playlist")]
    pub source: Option<String>,
    /// Length of each output file in minutes. Absent or 0 keeps the whole file.
    #[arg(long)]
    pub duration: Option<u32>,
    #[arg(long)]
    pub temporary_dir: Option<PathBuf>,
    #[arg(long)]
    pub processed_dir: Option<PathBuf>,
    /// Leave the temporary download folder in place.
    #[arg(long)]
    pub keep_temporary: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct TrimArgs {
    /// Folder name under the temporary directory.
    #[arg(long)]
    pub collection: String,
    #[arg(long, default_value_t = 1)]
    pub duration: u32,
    #[arg(long)]
    pub temporary_dir: Option<PathBuf>,
    #[arg(long)]
    pub processed_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_level_flags_download() {
        let cli = Cli::parse_from(["ytclip", "--playlist", "PL123", "--duration", "3"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.download.source.as_deref(), Some("PL123"));
        assert_eq!(cli.download.duration, Some(3));
    }

    #[test]
    fn duration_is_optional() {
        let cli = Cli::parse_from(["ytclip", "--source", "abc"]);
        assert_eq!(cli.download.duration, None);
        assert!(!cli.download.keep_temporary);
    }

    #[test]
    fn trim_subcommand_defaults_to_one_minute() {
        let cli = Cli::parse_from(["ytclip", "trim", "--collection", "Mix"]);
        match cli.command {
            Some(Commands::Trim(args)) => {
                assert_eq!(args.collection, "Mix");
                assert_eq!(args.duration, 1);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn non_numeric_duration_is_rejected() {
        assert!(Cli::try_parse_from(["ytclip", "--source", "abc", "--duration", "ten"]).is_err());
    }
}
