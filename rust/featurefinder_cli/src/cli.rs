use clap::{
    Parser,
    Subcommand,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Find peptide features in one or more runs.
    FindFeatures(FindFeaturesArgs),
    /// Write template configuration files.
    WriteTemplate(WriteTemplateArgs),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Json,
    Tsv,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Tsv => "tsv",
        }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct FindFeaturesArgs {
    /// JSON run files to process.
    #[arg(short, long, required = true, num_args = 1..)]
    pub run: Vec<PathBuf>,

    /// JSON file with the feature finding settings, defaults are used when absent.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// JSON file with a feature filter applied before writing.
    #[arg(short, long)]
    pub selector: Option<PathBuf>,

    /// Directory for the feature files.
    #[arg(short, long)]
    pub output_dir: PathBuf,

    /// The format to use for the output
    #[arg(short, long, default_value_t, value_enum)]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct WriteTemplateArgs {
    /// The path to the output files.
    #[arg(short, long)]
    pub output_path: PathBuf,
}
