#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line front end for the curve number pipeline.
//!
//! Reads an AOI from GeoJSON, runs the pipeline against the NLCD and
//! SSURGO services, and writes the requested layers plus a
//! `manifest.json` into the output directory.
//!
//! Uses `indicatif-log-bridge` (via [`curve_number_cli_utils::init_logger`])
//! so log lines and the stage progress bar share the terminal. Ctrl-C
//! cancels the run at the next stage boundary.

mod aoi_input;
mod store;

use std::path::PathBuf;

use clap::Parser;
use curve_number_cli_utils::IndicatifProgress;
use curve_number_derive::CnLookupTable;
use curve_number_models::Crs;
use curve_number_pipeline::{
    CancellationFlag, OutputSelection, PipelineParams, PipelineServices, RunOutcome,
    ServiceConfig, run,
};

#[derive(Parser)]
#[command(
    name = "curve_number",
    about = "Generate a curve number layer from NLCD land cover and SSURGO soils"
)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// GeoJSON geometry, feature, or feature collection with the AOI polygons
    #[arg(long)]
    aoi: PathBuf,

    /// CRS of the AOI coordinates
    #[arg(long, default_value = "EPSG:4326")]
    crs: Crs,

    /// CSV with `GDCode` and `CN_Join` columns (defaults to the built-in table)
    #[arg(long)]
    lookup: Option<PathBuf>,

    /// Resolve dual hydrologic soil groups as drained (`B/D` becomes `B`)
    #[arg(long)]
    drained_soils: bool,

    /// Write the reclassified NLCD raster
    #[arg(long)]
    nlcd_raster: bool,

    /// Write the vectorized NLCD layer
    #[arg(long)]
    nlcd_vector: bool,

    /// Write the prepared SSURGO soil layer
    #[arg(long)]
    soil: bool,

    /// Write the curve number layer (the default when no output is chosen)
    #[arg(long)]
    curve_number: bool,

    /// Set land cover values outside the reclassification table to no-data
    #[arg(long)]
    nodata_for_missing: bool,

    /// Service configuration TOML (defaults to the built-in endpoints)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory the layers and manifest are written to
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,
}

impl Cli {
    fn selection(&self) -> OutputSelection {
        let selection = OutputSelection {
            land_cover_raster: self.nlcd_raster,
            land_cover_vector: self.nlcd_vector,
            soil: self.soil,
            curve_number: self.curve_number,
        };
        if selection.is_empty() {
            OutputSelection::curve_number_only()
        } else {
            selection
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = curve_number_cli_utils::init_logger();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ServiceConfig::from_path(path)?,
        None => ServiceConfig::embedded()?,
    };
    let lookup = match &cli.lookup {
        Some(path) => CnLookupTable::from_path(path)?,
        None => CnLookupTable::embedded()?,
    };

    let params = PipelineParams {
        aoi: aoi_input::read_aoi(&cli.aoi, cli.crs)?,
        lookup,
        drained_soils: cli.drained_soils,
        outputs: cli.selection(),
        nodata_for_missing: cli.nodata_for_missing,
    };
    let services = PipelineServices::from_config(&config)?;

    let cancel = CancellationFlag::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received, stopping after the current stage");
            on_interrupt.cancel();
        }
    });

    let progress = IndicatifProgress::stages_bar(&multi, "Curve number");
    match run(&params, &services, progress, &cancel).await? {
        RunOutcome::Completed(outputs) => {
            let manifest = store::write_outputs(&cli.output_dir, &outputs)?;
            log::info!(
                "Wrote {} layer(s); manifest at {}",
                manifest.layers.len(),
                store::manifest_path(&cli.output_dir).display()
            );
            Ok(())
        }
        RunOutcome::Rejected { message } => Err(message.into()),
        RunOutcome::Cancelled => {
            log::warn!("Run cancelled; no outputs written");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_output_flag_requests_curve_number() {
        let cli = Cli::parse_from(["curve_number", "--aoi", "aoi.geojson"]);
        assert_eq!(cli.selection(), OutputSelection::curve_number_only());
        assert_eq!(cli.crs.to_string(), "EPSG:4326");
        assert_eq!(cli.output_dir, PathBuf::from("output"));
    }

    #[test]
    fn explicit_flags_are_kept() {
        let cli = Cli::parse_from([
            "curve_number",
            "--aoi",
            "aoi.geojson",
            "--crs",
            "epsg:5070",
            "--soil",
            "--nlcd-raster",
            "--drained-soils",
        ]);
        let selection = cli.selection();
        assert!(selection.soil && selection.land_cover_raster);
        assert!(!selection.curve_number);
        assert!(cli.drained_soils);
        assert_eq!(cli.crs.to_string(), "EPSG:5070");
    }

    #[test]
    fn invalid_crs_is_rejected() {
        assert!(Cli::try_parse_from(["curve_number", "--aoi", "a.json", "--crs", "5070"]).is_err());
    }
}
