use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;

use biasmap::drilldown::{drill_down, DrillTarget};
use biasmap::feed::{load_dashboard, SourceKind};
use biasmap::interpret::format_table;
use biasmap::logging::{log, obj, v_str, Domain, Level};
use biasmap::observation::{Metric, PowerFilter};
use biasmap::render::{write_outputs, DashboardPage};
use biasmap::state::{Config, DashboardState};
use biasmap::view::{build_view, Selection, ViewOutcome};

#[derive(Parser)]
#[command(name = "biasmap")]
#[command(version, about = "Heatmaps of demographic bias experiments")]
struct Cli {
    #[command(flatten)]
    source: SourceArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SourceArgs {
    /// Directory holding models.json and <stem>_data.csv files (overrides DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<String>,
    /// Base URL serving the same layout (overrides DATA_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,
}

#[derive(Args)]
struct SelectionArgs {
    #[arg(long)]
    model: String,
    /// cosine | score
    #[arg(long, default_value = "cosine", value_parser = parse_metric)]
    metric: Metric,
    /// all | 0 | 1
    #[arg(long, default_value = "all", value_parser = parse_power)]
    power: PowerFilter,
}

impl SelectionArgs {
    fn selection(&self) -> Selection {
        Selection::new(self.model.as_str(), self.metric, self.power)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Load, aggregate and write index.html + views.json
    Build {
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Print one selection as JSON
    View {
        #[command(flatten)]
        selection: SelectionArgs,
    },
    /// Print one page of the raw rows behind a cell as JSON
    ///
    /// Subject and responder select a cell; only one of them selects its mean;
    /// neither selects the grand mean.
    Drill {
        #[arg(long)]
        model: String,
        #[arg(long, default_value = "all", value_parser = parse_power)]
        power: PowerFilter,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        responder: Option<String>,
        /// Zero-based page index
        #[arg(long, default_value_t = 0)]
        page: usize,
        /// Defaults to ITEMS_PER_PAGE
        #[arg(long)]
        per_page: Option<usize>,
    },
    /// Print the per-axis extremes of a selection
    Interpret {
        #[command(flatten)]
        selection: SelectionArgs,
    },
}

fn parse_metric(s: &str) -> Result<Metric, String> {
    Metric::parse(s).ok_or_else(|| format!("unknown metric '{}' (cosine | score)", s))
}

fn parse_power(s: &str) -> Result<PowerFilter, String> {
    PowerFilter::parse(s).ok_or_else(|| format!("unknown power filter '{}' (all | 0 | 1)", s))
}

fn drill_target(subject: Option<String>, responder: Option<String>) -> DrillTarget {
    match (subject, responder) {
        (Some(subject), Some(responder)) => DrillTarget::Cell { subject, responder },
        (Some(subject), None) => DrillTarget::RowMean { subject },
        (None, Some(responder)) => DrillTarget::ColumnMean { responder },
        (None, None) => DrillTarget::Grand,
    }
}

async fn load(cfg: &Config) -> Result<DashboardState> {
    let source = SourceKind::from_config(cfg).build(cfg)?;
    log(
        Level::Info,
        Domain::System,
        "load_start",
        obj(&[("source", v_str(&source.describe()))]),
    );
    load_dashboard(source.as_ref()).await
}

fn require_model(state: &DashboardState, model: &str) -> Result<()> {
    if state.has_model(model) {
        Ok(())
    } else {
        Err(anyhow!("unknown model '{}' (known: {})", model, state.models.join(", ")))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut cfg = Config::from_env();
    if let Some(dir) = cli.source.data_dir {
        cfg.data_dir = dir;
    }
    if let Some(url) = cli.source.base_url {
        cfg.data_base_url = Some(url);
    }

    match cli.command {
        Commands::Build { out } => {
            if let Some(out) = out {
                cfg.out_dir = out.display().to_string();
            }
            let state = load(&cfg).await?;
            let page = DashboardPage::build(&state, &cfg);
            let paths = write_outputs(&page, PathBuf::from(&cfg.out_dir).as_path())?;
            for p in paths {
                println!("wrote {}", p.display());
            }
        }
        Commands::View { selection } => {
            let state = load(&cfg).await?;
            require_model(&state, &selection.model)?;
            let outcome = build_view(&state, &selection.selection(), &cfg);
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Commands::Drill {
            model,
            power,
            subject,
            responder,
            page,
            per_page,
        } => {
            let state = load(&cfg).await?;
            require_model(&state, &model)?;
            let target = drill_target(subject, responder);
            match drill_down(&state.observations, &model, power, &target) {
                Some(d) => {
                    let p = d.page(page, per_page.unwrap_or(cfg.items_per_page));
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&json!({ "title": d.title, "page": p }))?
                    );
                }
                None => {
                    log(
                        Level::Info,
                        Domain::View,
                        "drill_empty",
                        obj(&[("model", v_str(&model)), ("power", v_str(power.as_str()))]),
                    );
                    println!("No underlying raw data found for this selection.");
                }
            }
        }
        Commands::Interpret { selection } => {
            let state = load(&cfg).await?;
            require_model(&state, &selection.model)?;
            match build_view(&state, &selection.selection(), &cfg) {
                ViewOutcome::Ready(bundle) => {
                    println!("Interpretations for {} ({})", bundle.selection.model, bundle.selection.power.describe());
                    println!("Metric: {}", bundle.metric.description);
                    print!("{}", format_table(&bundle.interpretation));
                }
                ViewOutcome::Empty { .. } => {
                    println!("No data available for this selection.");
                }
            }
        }
    }
    Ok(())
}
