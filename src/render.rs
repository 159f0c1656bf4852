//! Static dashboard page: every view bundle precomputed and embedded as one
//! JSON blob, drawn client-side as a colored table.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::drilldown::{examples_by_model, ExampleRow};
use crate::logging::{log, obj, v_str, Domain, Level, ProfileScope};
use crate::state::{Config, DashboardState};
use crate::summary::{demographics_structure, power_findings, PowerFindings, ScenarioCatalog};
use crate::view::{all_selections, build_view, ViewOutcome};

/// Everything the page needs.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardPage {
    pub generated: String,
    pub models: Vec<String>,
    /// Keyed by `Selection::key()`.
    pub views: BTreeMap<String, ViewOutcome>,
    pub power_findings: PowerFindings,
    pub scenarios: ScenarioCatalog,
    pub demographics: BTreeMap<String, BTreeSet<String>>,
    /// Aggregable rows per model, filtered client-side when a cell is clicked.
    pub examples: BTreeMap<String, Vec<ExampleRow>>,
    pub items_per_page: usize,
}

impl DashboardPage {
    pub fn build(state: &DashboardState, cfg: &Config) -> Self {
        let _p = ProfileScope::with_context("build_page", &[("models", json!(state.models.len()))]);
        let views = all_selections(state)
            .into_iter()
            .map(|sel| (sel.key(), build_view(state, &sel, cfg)))
            .collect();
        Self {
            generated: chrono::Utc::now().to_rfc3339(),
            models: state.models.clone(),
            views,
            power_findings: power_findings(&state.observations),
            scenarios: ScenarioCatalog::from_observations(&state.observations),
            demographics: demographics_structure(&state.observations),
            examples: examples_by_model(&state.observations),
            items_per_page: cfg.items_per_page,
        }
    }

    pub fn ready_views(&self) -> usize {
        self.views.values().filter(|v| v.bundle().is_some()).count()
    }
}

/// JSON safe to inline inside a `<script>` element.
fn script_json<T: Serialize>(value: &T) -> Result<String> {
    let raw = serde_json::to_string(value).context("serialize dashboard data")?;
    Ok(raw.replace("</", "<\\/"))
}

pub fn render_dashboard(page: &DashboardPage) -> Result<String> {
    let _p = ProfileScope::new("render_dashboard");
    Ok(TEMPLATE.replace("__DASHBOARD_DATA__", &script_json(page)?))
}

/// Write `index.html` and `views.json` under `out_dir`.
pub fn write_outputs(page: &DashboardPage, out_dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(out_dir).with_context(|| format!("create {}", out_dir.display()))?;
    let html = render_dashboard(page)?;
    let html_path = out_dir.join("index.html");
    std::fs::write(&html_path, &html).with_context(|| format!("write {}", html_path.display()))?;
    let views_path = out_dir.join("views.json");
    std::fs::write(&views_path, serde_json::to_string_pretty(&page.views)?)
        .with_context(|| format!("write {}", views_path.display()))?;

    log(
        Level::Info,
        Domain::Render,
        "dashboard_written",
        obj(&[
            ("path", v_str(&html_path.display().to_string())),
            ("kb", json!(html.len() as f64 / 1024.0)),
            ("views", json!(page.views.len())),
            ("ready_views", json!(page.ready_views())),
        ]),
    );
    Ok(vec![html_path, views_path])
}

const TEMPLATE: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>Demographic Bias Heatmap</title>
  <style>
    :root {
      --bg: #0d1117; --bg-raised: #161b22; --fg: #c9d1d9; --fg-muted: #8b949e; --fg-bright: #f0f6fc;
      --accent: #58a6ff; --border: #30363d;
      --mono: 'JetBrains Mono', 'Fira Code', 'SF Mono', monospace;
      --sans: -apple-system, BlinkMacSystemFont, 'Segoe UI', Helvetica, Arial, sans-serif;
      --radius: 8px;
    }
    *, *::before, *::after { box-sizing: border-box; margin: 0; padding: 0; }
    body { font-family: var(--sans); background: var(--bg); color: var(--fg); line-height: 1.5; }
    main { max-width: 1400px; margin: 0 auto; padding: 1.5rem; }
    h1 { color: var(--fg-bright); font-size: 1.4rem; margin-bottom: 0.25rem; }
    h2 { color: var(--fg-bright); font-size: 1.05rem; margin: 1.5rem 0 0.5rem; border-bottom: 1px solid var(--border); padding-bottom: 0.3rem; }
    .sub { color: var(--fg-muted); font-size: 0.8rem; font-family: var(--mono); }
    .controls { display: flex; gap: 1rem; margin: 1rem 0; flex-wrap: wrap; }
    .controls label { font-size: 0.8rem; color: var(--fg-muted); }
    select, input { background: var(--bg-raised); color: var(--fg); border: 1px solid var(--border); border-radius: 4px; padding: 0.3rem 0.5rem; }
    .findings { display: flex; gap: 0.75rem; flex-wrap: wrap; }
    .card { background: var(--bg-raised); border: 1px solid var(--border); border-radius: var(--radius); padding: 0.6rem 0.9rem; font-size: 0.8rem; }
    .heat-wrap { overflow: auto; }
    table.heat { border-collapse: collapse; font-size: 0.7rem; font-family: var(--mono); }
    table.heat th { color: var(--fg-muted); font-weight: 500; padding: 0.2rem 0.4rem; white-space: nowrap; }
    table.heat th.col { writing-mode: vertical-rl; transform: rotate(180deg); }
    table.heat td { width: 42px; height: 26px; text-align: center; border: 1px solid var(--bg); cursor: pointer; }
    table.heat td.na { background: #222; }
    table.heat td.mean { outline: 1px solid var(--fg-muted); }
    .empty { color: var(--fg-muted); padding: 2rem; text-align: center; }
    ul.plain { list-style: none; font-size: 0.8rem; }
    ul.plain li { padding: 0.15rem 0; }
    .group { margin-bottom: 0.75rem; }
    .group h3 { font-size: 0.85rem; color: var(--accent); }
    #cell-info { white-space: pre; font-family: var(--mono); font-size: 0.75rem; }
    #examples { margin-top: 0.75rem; }
    #examples[hidden], #load-more[hidden] { display: none; }
    .example { background: var(--bg-raised); border: 1px solid var(--border); border-radius: var(--radius); padding: 0.6rem 0.9rem; margin-bottom: 0.5rem; font-size: 0.8rem; }
    .example .meta { display: flex; gap: 1.5rem; flex-wrap: wrap; color: var(--fg-muted); }
    .example .resp { white-space: pre-wrap; margin: 0.3rem 0; }
    .band-0 { color: #f85149; } .band-025 { color: #ff7b72; } .band-05 { color: var(--fg-muted); }
    .band-075 { color: #7ee787; } .band-1 { color: #3fb950; } .band-na { color: var(--fg-muted); }
    button { background: var(--bg-raised); color: var(--accent); border: 1px solid var(--border); border-radius: 4px; padding: 0.3rem 0.8rem; cursor: pointer; }
  </style>
</head>
<body>
<main>
  <h1>Demographic Bias Heatmap</h1>
  <div class="sub" id="generated"></div>

  <h2>Overall Findings</h2>
  <div class="findings" id="findings"></div>

  <div class="controls">
    <label>Model <select id="model"></select></label>
    <label>Metric
      <select id="metric">
        <option value="avgCosine">Avg Cosine Distance</option>
        <option value="avgScore">Avg Win Rate</option>
      </select>
    </label>
    <label>Power
      <select id="power">
        <option value="all">All Scenarios</option>
        <option value="0">No Power Disparity</option>
        <option value="1">Power Disparity</option>
      </select>
    </label>
  </div>

  <h2 id="title"></h2>
  <div class="sub" id="stats"></div>
  <div class="heat-wrap" id="heatmap"></div>
  <div class="card" id="cell-info">Click a cell to inspect it.</div>
  <section id="examples" hidden>
    <h2 id="examples-title"></h2>
    <div class="sub" id="examples-count"></div>
    <div id="examples-list"></div>
    <button id="load-more" hidden>Load more</button>
  </section>

  <h2 id="interp-title">Interpretations</h2>
  <ul class="plain" id="interpretation"></ul>

  <h2>Scenarios</h2>
  <input id="scenario-filter" placeholder="Filter by id or text">
  <div id="scenarios"></div>

  <h2>Demographics</h2>
  <div id="demographics"></div>
</main>

<script type="application/json" id="dashboard-data">__DASHBOARD_DATA__</script>
<script>
  const D = JSON.parse(document.getElementById('dashboard-data').textContent);
  const $ = id => document.getElementById(id);
  const esc = s => String(s).replace(/[&<>"]/g, c => ({'&':'&amp;','<':'&lt;','>':'&gt;','"':'&quot;'}[c]));
  const fmt = (v, d) => v === null || v === undefined ? 'N/A' : v.toFixed(d);

  $('generated').textContent = 'generated ' + D.generated;
  const pf = D.power_findings;
  $('findings').innerHTML =
    `<div class="card">No Power Disparity (Avg Cos: ${fmt(pf.absent.avg_cosine, 3)}, Avg WR: ${fmt(pf.absent.avg_score, 3)})</div>` +
    `<div class="card">Power Disparity (Avg Cos: ${fmt(pf.present.avg_cosine, 3)}, Avg WR: ${fmt(pf.present.avg_score, 3)})</div>`;
  $('model').innerHTML = D.models.map(m => `<option value="${esc(m)}">${esc(m)}</option>`).join('');

  function current() {
    return D.views[`${$('model').value}|${$('metric').value}|${$('power').value}`];
  }

  function draw() {
    const v = current();
    const heat = $('heatmap');
    if (!v || v.status === 'empty') {
      $('title').textContent = 'No data for this selection';
      $('stats').textContent = '';
      $('interpretation').innerHTML = '';
      heat.innerHTML = '<div class="empty">No aggregated pairs for this model and power filter.</div>';
      return;
    }
    $('title').textContent = v.title;
    $('stats').textContent = v.stats
      ? `mean ${fmt(v.stats.mean, 3)} | stdev ${fmt(v.stats.stdev, 3)} | ${v.stats.cells} pairs | range [${fmt(v.metric.zmin, 2)}, ${fmt(v.metric.zmax, 2)}]`
      : '';
    const m = v.matrix;
    const ann = {};
    v.annotations.forEach(a => { ann[a.row + ':' + a.col] = a; });
    let html = '<table class="heat"><tr><th></th>' +
      m.col_labels.map(c => `<th class="col">${esc(c)}</th>`).join('') + '</tr>';
    m.row_labels.forEach((r, i) => {
      html += `<tr><th>${esc(r)}</th>`;
      m.col_labels.forEach((_, j) => {
        const a = ann[i + ':' + j];
        const link = m.link_data[i][j];
        const cls = [a ? '' : 'na', link && link.is_mean ? 'mean' : ''].join(' ');
        const style = a ? `background:${a.background};color:${a.text_color}` : '';
        html += `<td class="${cls}" style="${style}" data-i="${i}" data-j="${j}" title="${esc(m.hover_text[i][j])}">${a ? a.text : ''}</td>`;
      });
      html += '</tr>';
    });
    heat.innerHTML = html + '</table>';

    const interp = Object.entries(v.interpretation);
    $('interp-title').textContent = `Interpretations (${v.metric.description})`;
    $('interpretation').innerHTML = interp.length
      ? interp.map(([axis, e]) =>
          `<li><b>${esc(axis)}</b>: highest ${esc(e.max_pair)} = ${fmt(e.max_value, 3)}; lowest ${esc(e.min_pair)} = ${fmt(e.min_value, 3)}</li>`).join('')
      : '<li>No specific demographic interactions found.</li>';
  }

  const scenarioText = {};
  Object.values(D.scenarios.groups).forEach(items => items.forEach(s => { scenarioText[s.id] = s.text; }));
  let shown = { rows: [], count: 0 };

  function drillTitle(link) {
    if (!link.is_mean) return `Examples: ${link.subject} (SUB) vs ${link.responder} (RES)`;
    if (link.mean_type === 'row') return `Examples for Mean: ${link.subject} (SUB) across all RES`;
    if (link.mean_type === 'column') return `Examples for Mean: ${link.responder} (RES) across all SUB`;
    return 'Examples for Overall Mean';
  }

  function drillMatches(link, r) {
    if (!link.is_mean) return r.subject === link.subject && r.responder === link.responder;
    if (link.mean_type === 'row') return r.subject === link.subject;
    if (link.mean_type === 'column') return r.responder === link.responder;
    return true;
  }

  function exampleHtml(r, n) {
    const score = r.score === null ? 'N/A' : r.score.toFixed(2);
    return `<div class="example"><div class="meta"><b>Sample ${n} of ${shown.rows.length}</b>` +
      `<span>Scenario #${r.scenario}</span><span>Power Diff: ${r.power === 1 ? 'Present (1)' : 'Absent (0)'}</span>` +
      `<span>SUB: ${esc(r.subject)}</span><span>RES: ${esc(r.responder)}</span></div>` +
      `<p class="resp">${esc(scenarioText[r.scenario] || 'Scenario text not found.')}</p>` +
      `<div>Demog response (Cos Dist: ${fmt(r.cosine, 4)} | Win Rate: <span class="band-${r.band}">${score}</span>)</div>` +
      `<p class="resp">${esc(r.response || '(No Response)')}</p>` +
      `<div>Non-demog response</div><p class="resp">${esc(r.baseline || '(No Response)')}</p></div>`;
  }

  function showMore() {
    const next = Math.min(shown.count + D.items_per_page, shown.rows.length);
    $('examples-list').insertAdjacentHTML('beforeend',
      shown.rows.slice(shown.count, next).map((r, k) => exampleHtml(r, shown.count + k + 1)).join(''));
    shown.count = next;
    $('examples-count').textContent = `showing ${shown.count} of ${shown.rows.length}`;
    $('load-more').hidden = shown.count >= shown.rows.length;
  }

  function openExamples(link) {
    const power = $('power').value;
    const rows = (D.examples[$('model').value] || []).filter(r =>
      (power === 'all' || String(r.power) === power) && drillMatches(link, r));
    $('examples-list').innerHTML = '';
    if (!rows.length) {
      $('examples-title').textContent = 'No underlying raw data found for this selection.';
      $('examples-count').textContent = '';
      $('load-more').hidden = true;
    } else {
      $('examples-title').textContent = drillTitle(link);
      shown = { rows, count: 0 };
      showMore();
    }
    $('examples').hidden = false;
  }

  $('heatmap').addEventListener('click', ev => {
    const td = ev.target.closest('td');
    const v = current();
    if (!td || !v || v.status === 'empty') return;
    const m = v.matrix;
    const i = +td.dataset.i, j = +td.dataset.j;
    const link = m.link_data[i][j];
    $('cell-info').textContent = m.hover_text[i][j] || '(no data)';
    if (link) openExamples(link);
  });
  $('load-more').addEventListener('click', showMore);

  function drawScenarios() {
    const q = $('scenario-filter').value.toLowerCase().trim();
    const byId = /^\d+$/.test(q);
    let html = '';
    Object.entries(D.scenarios.groups).forEach(([ctx, items]) => {
      const kept = items.filter(s => q === '' ||
        (byId ? String(s.id) === q : (s.text.toLowerCase().includes(q) || ctx.toLowerCase().includes(q))));
      if (!kept.length) return;
      html += `<div class="group"><h3>${esc(ctx)}</h3><ul class="plain">` +
        kept.map(s => `<li>#${s.id} ${esc(s.text)}</li>`).join('') + '</ul></div>';
    });
    $('scenarios').innerHTML = html || '<div class="empty">No scenarios match.</div>';
  }

  $('demographics').innerHTML = Object.entries(D.demographics).map(([axis, ids]) =>
    `<div class="group"><h3>${esc(axis)}</h3><ul class="plain">${ids.map(i => `<li>${esc(i)}</li>`).join('')}</ul></div>`).join('');

  ['model', 'metric', 'power'].forEach(id => $(id).addEventListener('change', () => { $('examples').hidden = true; draw(); }));
  $('scenario-filter').addEventListener('input', drawScenarios);
  draw();
  drawScenarios();
</script>
</body>
</html>
"##;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::{Observation, Power};

    fn state() -> DashboardState {
        let mut o = Observation::bare("A", "man", "woman", Power::Absent, 0.2, 1.0);
        o.demographic_dim = "gender".into();
        o.contextual_dim = "work".into();
        o.text.scenario = "Ends a </script> tag".into();
        DashboardState::new(vec!["A".into()], vec![o])
    }

    #[test]
    fn test_page_has_every_selection() {
        let page = DashboardPage::build(&state(), &Config::default());
        assert_eq!(page.views.len(), 6);
        // Only the power-present views are empty.
        assert_eq!(page.ready_views(), 4);
    }

    #[test]
    fn test_render_escapes_script_close() {
        let page = DashboardPage::build(&state(), &Config::default());
        let html = render_dashboard(&page).unwrap();
        assert!(!html.contains("__DASHBOARD_DATA__"));
        assert!(html.contains("Ends a <\\/script> tag"));
        assert_eq!(html.matches("</script>").count(), 2);
    }

    #[test]
    fn test_page_embeds_examples_for_drill_down() {
        let mut st = state();
        let mut other = Observation::bare("A", "", "woman", Power::Present, 0.4, 0.5);
        other.text.scenario = "Skipped".into();
        st.observations.push(other);
        let cfg = Config {
            items_per_page: 7,
            ..Config::default()
        };
        let page = DashboardPage::build(&st, &cfg);
        let rows = &page.examples["A"];
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].band, "1");

        let html = render_dashboard(&page).unwrap();
        assert!(html.contains(r#""items_per_page":7"#));
        assert!(html.contains(r#""band":"1""#));
        assert!(html.contains(r#"id="load-more""#));
    }

    #[test]
    fn test_write_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let page = DashboardPage::build(&state(), &Config::default());
        let paths = write_outputs(&page, dir.path()).unwrap();
        assert_eq!(paths.len(), 2);
        let views: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&paths[1]).unwrap()).unwrap();
        assert_eq!(views["A|avgScore|1"]["status"], "empty");
        assert_eq!(views["A|avgScore|0"]["status"], "ready");
    }
}
