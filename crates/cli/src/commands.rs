use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run configured targets in batches
    Run {
        #[arg(long, help = "Config file path")]
        config: PathBuf,

        #[arg(long, help = "Run only this target")]
        target: Option<String>,

        #[arg(long, help = "Skip units completed by an earlier run")]
        resume: bool,

        #[arg(
            long,
            help = "Delete the saved progress and completion marker, then exit without running"
        )]
        clear_checkpoint: bool,

        #[arg(long, help = "Stop after this many units")]
        limit: Option<usize>,

        #[arg(long, help = "Override the configured batch size")]
        batch_size: Option<usize>,

        #[arg(
            long,
            help = "If specified, writes the JSON report to this file instead of stdout"
        )]
        report: Option<PathBuf>,
    },
    Progress {
        #[arg(long, help = "Config file path")]
        config: PathBuf,

        #[arg(long, help = "Target to inspect")]
        target: String,

        #[arg(
            long,
            help = "If set, prints the progress information as JSON instead of a table"
        )]
        json: bool,
    },
    Clear {
        #[arg(long, help = "Config file path")]
        config: PathBuf,

        #[arg(long, help = "Target whose progress is deleted")]
        target: String,
    },
    /// Check a downloaded file's length and CSV header
    Verify {
        #[arg(long)]
        file: PathBuf,

        #[arg(long)]
        expected_length: u64,

        /// Columns the header must contain
        #[arg(long, value_delimiter = ',')]
        require: Vec<String>,
    },
}
