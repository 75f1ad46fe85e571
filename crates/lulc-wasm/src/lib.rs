use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

use lulc_core::pipeline::{ForecastInputs, ForecastParams, ForecastPipeline, ForecastResult};
use lulc_core::scheme::{ClassificationScheme, LegendEntry};
use lulc_core::transition::{TransitionEncoder, TransitionEntry};
use lulc_core::CategoricalRaster;

/// Browser-side forecast request.
#[derive(Debug, Deserialize)]
struct ForecastRequest {
    inputs: ForecastInputs,
    #[serde(default)]
    params: ForecastParams,
}

/// Legend plus transition table shown next to the map.
#[derive(Debug, Serialize)]
struct SchemeView {
    legend: Vec<LegendEntry>,
    multiplier: u32,
    transitions: Vec<TransitionEntry>,
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| JsValue::from_str(&format!("Serialization failed: {e}")))
}

fn js_err(e: anyhow::Error) -> JsValue {
    JsValue::from_str(&format!("{e:#}"))
}

// ── Plain-Rust entry points (testable off-browser) ────────────────────────────

/// Empty input selects the built-in nine-class scheme.
fn parse_scheme(scheme_json: &str) -> Result<ClassificationScheme> {
    if scheme_json.trim().is_empty() {
        return Ok(ClassificationScheme::worldcover());
    }
    serde_json::from_str(scheme_json).context("Invalid scheme")
}

fn scheme_view(scheme_json: &str) -> Result<SchemeView> {
    let scheme = parse_scheme(scheme_json)?;
    let dictionary = TransitionEncoder::new(scheme.clone())?.build_dictionary()?;
    Ok(SchemeView {
        legend: scheme.legend(),
        multiplier: dictionary.multiplier,
        transitions: dictionary.entries().cloned().collect(),
    })
}

fn run_forecast(request_json: &str) -> Result<ForecastResult> {
    let request: ForecastRequest =
        serde_json::from_str(request_json).context("Invalid forecast request")?;
    let pipeline = ForecastPipeline::new(&request.params);
    pipeline.run(&request.inputs).context("Forecast failed")
}

/// RGBA bytes, north row first, transparent where undefined or unregistered.
fn rgba(raster: &CategoricalRaster, scheme: &ClassificationScheme) -> Vec<u8> {
    let (w, h) = (raster.extent.width, raster.extent.height);
    let mut out = vec![0u8; w * h * 4];
    for row in 0..h {
        let dst_row = h - 1 - row;
        for col in 0..w {
            let Some(rgb) = raster.get(row, col).and_then(|c| scheme.rgb(c).ok()) else { continue };
            let o = (dst_row * w + col) * 4;
            out[o..o + 3].copy_from_slice(&rgb);
            out[o + 3] = 255;
        }
    }
    out
}

// ── Exports ───────────────────────────────────────────────────────────────────

/// Legend and transition dictionary for a scheme JSON (empty → default scheme).
#[wasm_bindgen]
pub fn transition_dictionary(scheme_json: &str) -> Result<JsValue, JsValue> {
    to_js(&scheme_view(scheme_json).map_err(js_err)?)
}

/// Run the full forecast from `{ "inputs": .., "params": .. }`.
#[wasm_bindgen]
pub fn forecast(request_json: &str) -> Result<JsValue, JsValue> {
    to_js(&run_forecast(request_json).map_err(js_err)?)
}

/// Canvas-ready pixels for a categorical raster JSON.
#[wasm_bindgen]
pub fn render_rgba(
    raster_json: &str,
    scheme_json: &str,
) -> Result<js_sys::Uint8ClampedArray, JsValue> {
    let raster: CategoricalRaster = serde_json::from_str(raster_json)
        .map_err(|e| JsValue::from_str(&format!("Invalid raster: {e}")))?;
    let scheme = parse_scheme(scheme_json).map_err(js_err)?;
    Ok(js_sys::Uint8ClampedArray::from(rgba(&raster, &scheme).as_slice()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lulc_core::GridExtent;

    #[test]
    fn empty_scheme_json_selects_default() {
        let view = scheme_view("").unwrap();
        assert_eq!(view.legend.len(), 9);
        assert_eq!(view.multiplier, 1000);
        assert_eq!(view.transitions.len(), 81);
    }

    #[test]
    fn custom_scheme_labels_transitions() {
        let json = r#"[
            {"code":10,"name":"A","color":"000000"},
            {"code":20,"name":"B","color":"ffffff"}
        ]"#;
        let view = scheme_view(json).unwrap();
        let labels: Vec<&str> = view.transitions.iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, vec!["A -> A", "A -> B", "B -> A", "B -> B"]);
        assert_eq!(view.transitions[1].code, 1020);
    }

    #[test]
    fn malformed_request_reports_context() {
        let err = run_forecast("{}").unwrap_err();
        assert!(format!("{err:#}").starts_with("Invalid forecast request"));
    }

    #[test]
    fn rgba_puts_north_row_first() {
        let scheme = ClassificationScheme::worldcover();
        let raster =
            CategoricalRaster::from_cells(GridExtent::unit(1, 2), vec![Some(10), None]).unwrap();
        let px = rgba(&raster, &scheme);
        assert_eq!(&px[0..4], &[0, 0, 0, 0]);
        assert_eq!(&px[4..8], &[0x00, 0x64, 0x00, 255]);
    }
}
