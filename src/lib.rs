//! Demographic bias dashboard: aggregation of experiment rows into heatmap
//! views with marginal means, color annotation and drill-down.

pub mod aggregate;
pub mod color;
pub mod data;
pub mod drilldown;
pub mod feed;
pub mod interpret;
pub mod labels;
pub mod logging;
pub mod matrix;
pub mod observation;
pub mod render;
pub mod state;
pub mod summary;
pub mod view;
