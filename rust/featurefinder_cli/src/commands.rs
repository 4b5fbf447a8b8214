use indicatif::{
    ProgressIterator,
    ProgressStyle,
};
use std::fs::File;
use std::io::BufReader;
use std::path::{
    Path,
    PathBuf,
};
use std::time::Instant;

use featurefinder::{
    CancellationToken,
    FeatureFindingBroker,
    FeatureFindingConfig,
    FeatureSelector,
    FeatureSet,
    Run,
    RunFile,
};
use tracing::{
    info,
    instrument,
};

use crate::cli::{
    FindFeaturesArgs,
    OutputFormat,
    WriteTemplateArgs,
};
use crate::error::CliError;

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

fn load_run(path: &Path, config: &FeatureFindingConfig) -> Result<Run, CliError> {
    let run_file: RunFile = read_json(path)?;
    Ok(run_file.into_run(config.spectrum_cache_size, config.spectrum_read_retries)?)
}

/// Main function for the 'find-features' subcommand.
#[instrument(skip_all)]
pub fn main_find_features(args: FindFeaturesArgs) -> Result<(), CliError> {
    let config: FeatureFindingConfig = match &args.config {
        Some(path) => read_json(path)?,
        None => FeatureFindingConfig::default(),
    };
    config
        .validate()
        .map_err(|e| CliError::Config(e.to_string()))?;
    info!("Using feature finding config: {:#?}", config);

    let selector: Option<FeatureSelector> = args
        .selector
        .as_deref()
        .map(read_json)
        .transpose()?;

    std::fs::create_dir_all(&args.output_dir)?;

    let start = Instant::now();
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})",
    )?;
    let runs = args
        .run
        .iter()
        .progress_with_style(style)
        .map(|path| {
            let run = load_run(path, &config)?;
            info!(
                "Loaded {} from {} ({} MS1 scans)",
                run.name(),
                path.display(),
                run.ms1_scans().len()
            );
            Ok(run)
        })
        .collect::<Result<Vec<_>, CliError>>()?;

    let broker = FeatureFindingBroker::new(config)?;
    let token = CancellationToken::new();
    let feature_sets = broker.find_features_batch(&runs, &token)?;

    for set in feature_sets {
        let set = match &selector {
            Some(sel) => set.select(sel),
            None => set,
        };
        let out_path = write_feature_set(&set, &args.output_dir, args.format)?;
        info!("Wrote {} features to {}", set.len(), out_path.display());
    }
    info!("Processed {} runs in {:?}", runs.len(), start.elapsed());
    Ok(())
}

fn write_feature_set(set: &FeatureSet, dir: &Path, format: OutputFormat) -> Result<PathBuf, CliError> {
    let out_path = dir.join(format!("{}.features.{}", set.run_name, format.extension()));
    match format {
        OutputFormat::Json => set.write_json_file(&out_path)?,
        OutputFormat::Tsv => set.write_tsv_file(&out_path)?,
    }
    Ok(out_path)
}

const SELECTOR_TEMPLATE: &str = r#"{
  "min_charge": 1,
  "max_charge": 6,
  "min_peaks": 2,
  "max_kl": 3.0
}"#;

/// Main function for the 'write-template' subcommand.
pub fn main_write_template(args: WriteTemplateArgs) -> Result<(), CliError> {
    let target_dir = args.output_path;
    std::fs::create_dir_all(&target_dir)?;

    let peptide_path = target_dir.join("featurefinder_config.json");
    let small_molecule_path = target_dir.join("small_molecule_config.json");
    std::fs::write(
        &peptide_path,
        serde_json::to_string_pretty(&FeatureFindingConfig::default())?,
    )?;
    std::fs::write(
        &small_molecule_path,
        serde_json::to_string_pretty(&FeatureFindingConfig::small_molecule())?,
    )?;
    println!(
        "Wrote config templates to:\n- {}\n- {}",
        peptide_path.display(),
        small_molecule_path.display()
    );

    let selector_path = target_dir.join("selector_template.json");
    std::fs::write(&selector_path, SELECTOR_TEMPLATE)?;
    println!("Wrote selector template to: {}", selector_path.display());
    Ok(())
}
