pub mod csv;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::observation::{Observation, ObservationText, Power};

pub const EXPECTED_COLUMNS: [&str; 19] = [
    "scenario_id",
    "contextual_dim",
    "demographic_dim",
    "power_differential",
    "sub_persona_context",
    "sub_persona_demog",
    "sub_persona_final",
    "res_persona_context",
    "res_persona_demog",
    "res_persona_final",
    "scenario",
    "instruction",
    "prompt",
    "response",
    "final_scenario_id",
    "cosine_dist_from_no_demog",
    "model_abbrv",
    "response_non_demog",
    "score",
];

/// Columns without which a dataset cannot be aggregated at all.
pub const REQUIRED_COLUMNS: [&str; 10] = [
    "scenario_id",
    "contextual_dim",
    "demographic_dim",
    "power_differential",
    "sub_persona_demog",
    "res_persona_demog",
    "scenario",
    "cosine_dist_from_no_demog",
    "model_abbrv",
    "score",
];

pub const MODEL_COLUMN: &str = "model_abbrv";
pub const MODELS_INDEX_FILE: &str = "models.json";

/// Empty, unparseable or non-finite becomes NaN.
pub fn parse_metric(raw: &str) -> f64 {
    let t = raw.trim();
    if t.is_empty() {
        return f64::NAN;
    }
    t.parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(f64::NAN)
}

/// Integer ids, also accepting integral floats such as `12.0`.
pub fn parse_id(raw: &str) -> Option<i64> {
    let t = raw.trim();
    if let Ok(v) = t.parse::<i64>() {
        return Some(v);
    }
    t.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && v.fract() == 0.0)
        .map(|v| v as i64)
}

/// Column name -> position, from a header record.
#[derive(Debug, Clone)]
pub struct Header {
    columns: Vec<String>,
    index: HashMap<String, usize>,
}

impl Header {
    pub fn new(record: &[String]) -> Self {
        let columns: Vec<String> = record.iter().map(|c| c.trim().to_string()).collect();
        let mut index = HashMap::new();
        for (i, c) in columns.iter().enumerate() {
            index.entry(c.clone()).or_insert(i);
        }
        Self { columns, index }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn missing(&self, wanted: &[&str]) -> Vec<String> {
        wanted
            .iter()
            .filter(|c| !self.index.contains_key(**c))
            .map(|c| c.to_string())
            .collect()
    }

    fn field<'a>(&self, record: &'a [String], name: &str) -> &'a str {
        self.position(name)
            .and_then(|i| record.get(i))
            .map(|s| s.as_str())
            .unwrap_or("")
    }
}

/// Convert one record. `None` when an id or the power flag cannot be read.
pub fn observation_from_record(header: &Header, record: &[String]) -> Option<Observation> {
    let f = |name: &str| header.field(record, name);
    let power = parse_id(f("power_differential")).and_then(Power::from_flag)?;
    Some(Observation {
        scenario_id: parse_id(f("scenario_id"))?,
        final_scenario_id: parse_id(f("final_scenario_id")),
        contextual_dim: f("contextual_dim").trim().to_string(),
        demographic_dim: f("demographic_dim").trim().to_string(),
        power,
        subject: f("sub_persona_demog").trim().to_string(),
        responder: f("res_persona_demog").trim().to_string(),
        model: f("model_abbrv").trim().to_string(),
        cosine_distance: parse_metric(f("cosine_dist_from_no_demog")),
        score: parse_metric(f("score")),
        text: ObservationText {
            sub_persona_context: f("sub_persona_context").to_string(),
            sub_persona_final: f("sub_persona_final").to_string(),
            res_persona_context: f("res_persona_context").to_string(),
            res_persona_final: f("res_persona_final").to_string(),
            scenario: f("scenario").to_string(),
            instruction: f("instruction").to_string(),
            prompt: f("prompt").to_string(),
            response: f("response").to_string(),
            response_non_demog: f("response_non_demog").to_string(),
        },
    })
}

/// Load-time row filter: every label and dimension present and at least one
/// metric measured.
pub fn is_valid(obs: &Observation) -> bool {
    !obs.model.is_empty()
        && obs.is_aggregable()
        && !obs.text.scenario.trim().is_empty()
        && !obs.contextual_dim.is_empty()
        && !obs.demographic_dim.is_empty()
        && (!obs.cosine_distance.is_nan() || !obs.score.is_nan())
}

#[derive(Debug, Clone, Default)]
pub struct ParsedDataset {
    pub observations: Vec<Observation>,
    /// Rows that failed conversion or the validity filter.
    pub dropped: usize,
    pub columns: Vec<String>,
}

/// Parse a dataset CSV. Missing required columns are an error; bad rows are
/// counted and skipped.
pub fn parse_dataset(text: &str) -> Result<ParsedDataset> {
    let records = csv::parse_records(text)?;
    let mut iter = records.into_iter();
    let header = Header::new(&iter.next().ok_or_else(|| anyhow!("empty dataset"))?);
    let missing = header.missing(&REQUIRED_COLUMNS);
    if !missing.is_empty() {
        return Err(anyhow!("schema mismatch: missing columns {:?}", missing));
    }

    let mut out = ParsedDataset {
        columns: header.columns().to_vec(),
        ..Default::default()
    };
    for record in iter {
        match observation_from_record(&header, &record).filter(is_valid) {
            Some(obs) => out.observations.push(obs),
            None => out.dropped += 1,
        }
    }
    Ok(out)
}

// =============================================================================
// Models index and per-model split
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelsIndex {
    pub models: Vec<String>,
    /// Model name -> filename stem.
    pub filename_stems: BTreeMap<String, String>,
}

impl ModelsIndex {
    pub fn stem_for(&self, model: &str) -> Option<&str> {
        self.filename_stems.get(model).map(|s| s.as_str())
    }

    pub fn dataset_file(stem: &str) -> String {
        format!("{}_data.csv", stem)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("parse models index")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read {}", path.display()))?;
        Self::from_json(&text)
    }
}

/// Filesystem-safe stem for a model name.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '\\' | '/' | '*' | '?' | ':' | '"' | '<' | '>' | '|'))
        .map(|c| if c == ' ' { '_' } else { c })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct SplitSummary {
    pub index: ModelsIndex,
    /// Rows written per model.
    pub rows: BTreeMap<String, usize>,
    pub skipped: usize,
}

/// Split a combined CSV into `<stem>_data.csv` files plus `models.json`.
///
/// Models keep their order of first appearance. Rows without a model are
/// skipped.
pub fn split_by_model(input: &Path, out_dir: &Path) -> Result<SplitSummary> {
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("read {}", input.display()))?;
    let records = csv::parse_records(&text)?;
    let mut iter = records.into_iter();
    let header_record = iter.next().ok_or_else(|| anyhow!("empty input {}", input.display()))?;
    let header = Header::new(&header_record);
    let model_col = header
        .position(MODEL_COLUMN)
        .ok_or_else(|| anyhow!("column '{}' not found", MODEL_COLUMN))?;

    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<Vec<String>>> = HashMap::new();
    let mut skipped = 0usize;
    for record in iter {
        let model = record.get(model_col).map(|m| m.trim()).unwrap_or("");
        if model.is_empty() {
            skipped += 1;
            continue;
        }
        if !groups.contains_key(model) {
            order.push(model.to_string());
        }
        groups.entry(model.to_string()).or_default().push(record);
    }
    if order.is_empty() {
        return Err(anyhow!("no models found in {}", input.display()));
    }

    std::fs::create_dir_all(out_dir).with_context(|| format!("create {}", out_dir.display()))?;
    let mut index = ModelsIndex::default();
    let mut rows = BTreeMap::new();
    for model in &order {
        let stem = sanitize_filename(model);
        let path = out_dir.join(ModelsIndex::dataset_file(&stem));
        let group = groups.get(model).map(|g| g.as_slice()).unwrap_or(&[]);
        let mut body = csv::write_record(&header_record);
        for record in group {
            body.push_str(&csv::write_record(record));
        }
        std::fs::write(&path, body).with_context(|| format!("write {}", path.display()))?;
        rows.insert(model.clone(), group.len());
        index.models.push(model.clone());
        index.filename_stems.insert(model.clone(), stem);
    }

    let index_path = out_dir.join(MODELS_INDEX_FILE);
    std::fs::write(&index_path, serde_json::to_string_pretty(&index)?)
        .with_context(|| format!("write {}", index_path.display()))?;
    Ok(SplitSummary {
        index,
        rows,
        skipped,
    })
}

// =============================================================================
// Dataset manifest
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetManifest {
    pub path: String,
    pub hash_sha256: String,
    pub row_count: u64,
    pub bad_rows: u64,
    pub columns: Vec<String>,
    pub missing_columns: Vec<String>,
    pub models: Vec<String>,
    pub warnings: Vec<String>,
    pub generated_at: String,
}

pub fn analyze_dataset(path: &Path) -> Result<DatasetManifest> {
    let hash = file_sha256(path)?;
    let text = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let records = csv::parse_records(&text)?;
    let mut warnings = Vec::new();

    let mut iter = records.into_iter();
    let header = match iter.next() {
        Some(h) => Header::new(&h),
        None => {
            warnings.push("missing_header".to_string());
            Header::new(&[])
        }
    };
    let missing_columns = header.missing(&EXPECTED_COLUMNS);
    let schema_ok = header.missing(&REQUIRED_COLUMNS).is_empty();
    if !schema_ok {
        warnings.push("missing_required_columns".to_string());
    }

    let mut row_count = 0u64;
    let mut bad_rows = 0u64;
    let mut models = BTreeSet::new();
    for (i, record) in iter.enumerate() {
        row_count += 1;
        if record.len() != header.columns().len() {
            warnings.push(format!("ragged_row: record {} has {} fields", i + 1, record.len()));
        }
        match observation_from_record(&header, &record).filter(is_valid) {
            Some(obs) if schema_ok => {
                models.insert(obs.model);
            }
            _ => bad_rows += 1,
        }
    }

    Ok(DatasetManifest {
        path: path.display().to_string(),
        hash_sha256: hash,
        row_count,
        bad_rows,
        columns: header.columns().to_vec(),
        missing_columns,
        models: models.into_iter().collect(),
        warnings,
        generated_at: chrono::Utc::now().to_rfc3339(),
    })
}

pub fn file_sha256(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

pub fn default_manifest_path(dataset_path: &Path) -> PathBuf {
    let mut p = dataset_path.to_path_buf();
    let fname = dataset_path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("dataset.csv");
    p.set_file_name(format!("{}.manifest.json", fname));
    p
}
