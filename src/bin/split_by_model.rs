use anyhow::Result;
use biasmap::data::split_by_model;
use std::env;
use std::path::PathBuf;

/// Splits a combined experiment CSV into per-model files plus models.json.
///
/// usage: split_by_model [input.csv] [out_dir]
fn main() -> Result<()> {
    let input = PathBuf::from(
        env::args()
            .nth(1)
            .unwrap_or_else(|| "data/combined_response_data_with_cosine_dist_and_score.csv".to_string()),
    );
    let out_dir = PathBuf::from(
        env::args()
            .nth(2)
            .unwrap_or_else(|| "data/split_by_model".to_string()),
    );

    println!("splitting {} by model into {}", input.display(), out_dir.display());
    let summary = split_by_model(&input, &out_dir)?;
    for model in &summary.index.models {
        println!(
            "  {} -> {}_data.csv ({} rows)",
            model,
            summary.index.stem_for(model).unwrap_or(""),
            summary.rows.get(model).copied().unwrap_or(0)
        );
    }
    if summary.skipped > 0 {
        println!("  skipped {} rows without a model", summary.skipped);
    }
    println!("wrote {}", out_dir.join("models.json").display());
    Ok(())
}
