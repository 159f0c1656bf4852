use anyhow::{Context, Result};
use biasmap::data::{analyze_dataset, default_manifest_path, MODELS_INDEX_FILE, ModelsIndex};
use std::env;
use std::fs;
use std::path::PathBuf;

/// Writes `<file>.manifest.json` next to each dataset. With a directory
/// argument every dataset listed in its models.json is covered.
fn main() -> Result<()> {
    let target = PathBuf::from(
        env::args()
            .nth(1)
            .unwrap_or_else(|| "data/split_by_model".to_string()),
    );

    let datasets: Vec<PathBuf> = if target.is_dir() {
        let index = ModelsIndex::load(&target.join(MODELS_INDEX_FILE))?;
        index
            .models
            .iter()
            .filter_map(|m| index.stem_for(m))
            .map(|stem| target.join(ModelsIndex::dataset_file(stem)))
            .collect()
    } else {
        vec![target]
    };

    let mut failures = 0;
    for path in &datasets {
        let manifest = match analyze_dataset(path) {
            Ok(m) => m,
            Err(err) => {
                eprintln!("analysis failed for {}: {:#}", path.display(), err);
                failures += 1;
                continue;
            }
        };
        if !manifest.missing_columns.is_empty() {
            eprintln!("{}: missing columns {:?}", path.display(), manifest.missing_columns);
        }
        let out_path = default_manifest_path(path);
        fs::write(&out_path, serde_json::to_string_pretty(&manifest)?)
            .with_context(|| format!("write {}", out_path.display()))?;
        println!(
            "wrote manifest {} ({} rows, {} bad)",
            out_path.display(),
            manifest.row_count,
            manifest.bad_rows
        );
    }

    if failures > 0 {
        std::process::exit(2);
    }
    Ok(())
}
