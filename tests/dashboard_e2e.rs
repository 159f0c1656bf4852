use biasmap::data::{csv::write_record, EXPECTED_COLUMNS};
use biasmap::drilldown::{drill_down, DrillTarget};
use biasmap::feed::{load_dashboard, FileSource};
use biasmap::matrix::{MeanType, RESPONDER_MEAN_LABEL, SUBJECT_MEAN_LABEL};
use biasmap::observation::{Metric, PowerFilter};
use biasmap::render::{write_outputs, DashboardPage};
use biasmap::state::Config;
use biasmap::view::{build_view, Selection, ViewOutcome};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

struct Row<'a> {
    model: &'a str,
    sub: &'a str,
    res: &'a str,
    axis: &'a str,
    power: &'a str,
    cos: &'a str,
    score: &'a str,
}

fn write_dataset(path: &Path, rows: &[Row]) {
    let mut out = write_record(&EXPECTED_COLUMNS);
    for r in rows {
        let fields: Vec<String> = EXPECTED_COLUMNS
            .iter()
            .map(|c| match *c {
                "scenario_id" => "7".to_string(),
                "contextual_dim" => "workplace".to_string(),
                "demographic_dim" => r.axis.to_string(),
                "power_differential" => r.power.to_string(),
                "sub_persona_demog" => r.sub.to_string(),
                "res_persona_demog" => r.res.to_string(),
                "scenario" => "Alex asks Blake for feedback, twice.".to_string(),
                "model_abbrv" => r.model.to_string(),
                "cosine_dist_from_no_demog" => r.cos.to_string(),
                "score" => r.score.to_string(),
                _ => String::new(),
            })
            .collect();
        out.push_str(&write_record(&fields));
    }
    fs::write(path, out).unwrap();
}

fn fixture() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("models.json"),
        r#"{"models": ["gpt", "llama", "ghost"], "filename_stems": {"gpt": "gpt", "llama": "llama", "ghost": "ghost"}}"#,
    )
    .unwrap();
    let r = |model, sub, res, axis, power, cos, score| Row { model, sub, res, axis, power, cos, score };
    write_dataset(
        &dir.path().join("gpt_data.csv"),
        &[
            r("gpt", "man", "woman", "gender", "0", "0.10", "1"),
            r("gpt", "man", "woman", "gender", "1", "0.30", "0"),
            r("gpt", "woman", "man", "gender", "0", "0.20", "0.5"),
            r("gpt", "old", "young", "age", "1", "0.40", ""),
            r("gpt", "old", "", "age", "0", "0.90", "1"),
        ],
    );
    write_dataset(
        &dir.path().join("llama_data.csv"),
        &[r("llama", "man", "woman", "gender", "1", "", "0.75")],
    );
    // ghost_data.csv is never written
    dir
}

#[tokio::test]
async fn loads_views_and_drills_from_disk() {
    let dir = fixture();
    let state = load_dashboard(&FileSource::new(dir.path())).await.unwrap();
    assert_eq!(state.models, vec!["ghost", "gpt", "llama"]);
    // The row without a responder is dropped at load.
    assert_eq!(state.observations.len(), 5);

    let cfg = Config::default();
    let sel = Selection::new("gpt", Metric::CosineDistance, PowerFilter::All);
    let ViewOutcome::Ready(view) = build_view(&state, &sel, &cfg) else {
        panic!("expected a ready view");
    };
    assert_eq!(view.matrix.col_labels, vec!["young", "man", "woman", RESPONDER_MEAN_LABEL]);
    assert_eq!(view.matrix.row_labels, vec![SUBJECT_MEAN_LABEL, "woman", "man", "old"]);
    let grand = view.matrix.link_data[0][3].as_ref().unwrap();
    assert_eq!(grand.mean_type, Some(MeanType::Grand));
    assert_eq!(grand.count, 4);
    assert!((grand.raw_value - 0.25).abs() < 1e-12);
    assert!(view.interpretation.contains_key("age"));
    assert_eq!(view.interpretation["gender"].max_pair, "woman (RES) → man (SUB)");

    let ghost = build_view(&state, &Selection::new("ghost", Metric::Score, PowerFilter::All), &cfg);
    assert!(matches!(ghost, ViewOutcome::Empty { .. }));

    let row_mean = DrillTarget::RowMean { subject: "man".into() };
    let d = drill_down(&state.observations, "gpt", PowerFilter::Present, &row_mean).unwrap();
    assert_eq!(d.len(), 1);
    assert_eq!(d.title, "Examples for Mean: man (SUB) across all RES");
    assert!(drill_down(&state.observations, "llama", PowerFilter::Absent, &DrillTarget::Grand).is_none());
}

#[tokio::test]
async fn build_writes_dashboard() {
    let dir = fixture();
    let state = load_dashboard(&FileSource::new(dir.path())).await.unwrap();
    let page = DashboardPage::build(&state, &Config::default());
    assert_eq!(page.views.len(), 3 * 2 * 3);
    let out = dir.path().join("out");
    write_outputs(&page, &out).unwrap();
    let html = fs::read_to_string(out.join("index.html")).unwrap();
    assert!(html.contains("\"models\":[\"ghost\",\"gpt\",\"llama\"]"));
    assert!(out.join("views.json").exists());
}

#[tokio::test]
async fn missing_index_is_fatal() {
    let dir = TempDir::new().unwrap();
    assert!(load_dashboard(&FileSource::new(dir.path())).await.is_err());
}
