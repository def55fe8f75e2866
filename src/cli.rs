use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "careermap",
    version,
    about = "Resume layout reconstruction and occupation mapping"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Extract(ExtractArgs),
    Embed(EmbedArgs),
    Analyze(AnalyzeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    /// Profile PDF or JSON token stream.
    #[arg(long)]
    pub input: PathBuf,

    #[arg(long)]
    pub layout_config: Option<PathBuf>,

    /// Writes to stdout when omitted.
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum EmbedRefreshMode {
    Full,
    MissingOrStale,
}

impl EmbedRefreshMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::MissingOrStale => "missing-or-stale",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct CorpusArgs {
    #[arg(long)]
    pub alternate_titles: PathBuf,

    #[arg(long = "source-prefix")]
    pub source_prefixes: Vec<String>,

    #[arg(long, default_value_t = false)]
    pub keep_unsourced: bool,
}

#[derive(Args, Debug, Clone)]
pub struct EmbedArgs {
    #[arg(long, default_value = ".cache/careermap")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[command(flatten)]
    pub corpus: CorpusArgs,

    #[arg(long, default_value = "title-hash-v1")]
    pub model_id: String,

    #[arg(long, value_enum, default_value_t = EmbedRefreshMode::MissingOrStale)]
    pub refresh_mode: EmbedRefreshMode,

    #[arg(long, default_value_t = 256)]
    pub batch_size: usize,

    #[arg(long)]
    pub semantic_model_lock_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    #[arg(long)]
    pub input: PathBuf,

    #[command(flatten)]
    pub corpus: CorpusArgs,

    #[arg(long)]
    pub occupation_data: PathBuf,

    #[arg(long, default_value = ".cache/careermap")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long, default_value = "title-hash-v1")]
    pub model_id: String,

    #[arg(long, default_value_t = 1)]
    pub top_n: usize,

    #[arg(long, default_value_t = 256)]
    pub batch_size: usize,

    /// Zero disables the budget.
    #[arg(long, default_value_t = 30_000)]
    pub embed_timeout_ms: u64,

    #[arg(long)]
    pub layout_config: Option<PathBuf>,

    #[arg(long)]
    pub report_path: Option<PathBuf>,

    #[arg(long)]
    pub summary_path: Option<PathBuf>,

    /// Pins "Present" to this month (YYYY-MM).
    #[arg(long)]
    pub today: Option<String>,
}
