//! Map renderer: writes PNG previews of rasters produced by the forecast tool.
//!
//!   visualize classes  prediction.json -o prediction.png
//!   visualize change   lulc2018.json prediction.json -o change.png
//!   visualize covariate dem.json -o dem.png
//!
//! North is up: grid row 0 (min_lat) is the bottom image row.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;

use lulc_core::{CategoricalRaster, ClassificationScheme, CovariateRaster, GridExtent};

/// Undefined cells.
const NODATA_RGB: [u8; 3] = [0, 0, 0];
/// Changed cells in the change view.
const CHANGE_RGB: [u8; 3] = [220, 30, 30];

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "visualize", about = "Render land-cover rasters to PNG")]
struct Args {
    #[command(subcommand)]
    view: View,

    /// Output PNG path
    #[arg(short, long, global = true, default_value = "map.png")]
    output: PathBuf,

    /// Scheme JSON (defaults to the built-in nine-class scheme)
    #[arg(long, global = true)]
    scheme: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum View {
    /// Class palette
    Classes { raster: PathBuf },
    /// Changed cells in red over a grayscale of the later map
    Change { before: PathBuf, after: PathBuf },
    /// Min–max stretched grayscale
    Covariate { raster: PathBuf },
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).with_context(|| format!("Cannot read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON: {}", path.display()))
}

// ── Colour helpers ────────────────────────────────────────────────────────────

fn class_color(scheme: &ClassificationScheme, code: Option<u16>) -> [u8; 3] {
    code.and_then(|c| scheme.rgb(c).ok()).unwrap_or(NODATA_RGB)
}

/// Grayscale shade of a class by its position in the scheme.
fn class_shade(scheme: &ClassificationScheme, code: Option<u16>) -> [u8; 3] {
    let Some(i) = code.and_then(|c| scheme.index_of(c).ok()) else { return NODATA_RGB };
    let v = (64 + 160 * i / scheme.size().max(1)) as u8;
    [v, v, v]
}

fn stretch(v: f32, lo: f32, hi: f32) -> [u8; 3] {
    if v.is_nan() {
        return NODATA_RGB;
    }
    let t = ((v - lo) / (hi - lo).max(f32::EPSILON)).clamp(0.0, 1.0);
    let c = (t * 255.0) as u8;
    [c, c, c]
}

// ── Rendering ─────────────────────────────────────────────────────────────────

fn render(extent: GridExtent, pixel: impl Fn(usize) -> [u8; 3]) -> image::RgbImage {
    let (w, h) = (extent.width, extent.height);
    let mut img = image::RgbImage::new(w as u32, h as u32);
    for r in 0..h {
        for c in 0..w {
            img.put_pixel(c as u32, (h - 1 - r) as u32, image::Rgb(pixel(extent.index(r, c))));
        }
    }
    img
}

fn classes_image(raster: &CategoricalRaster, scheme: &ClassificationScheme) -> image::RgbImage {
    render(raster.extent, |i| class_color(scheme, raster.data[i]))
}

fn change_image(
    before: &CategoricalRaster,
    after: &CategoricalRaster,
    scheme: &ClassificationScheme,
) -> Result<(image::RgbImage, usize)> {
    before.extent.ensure_aligned("after", &after.extent)?;
    let changed =
        |i: usize| matches!((before.data[i], after.data[i]), (Some(a), Some(b)) if a != b);
    let n = (0..after.len()).filter(|&i| changed(i)).count();
    let img = render(after.extent, |i| {
        if changed(i) {
            CHANGE_RGB
        } else {
            class_shade(scheme, after.data[i])
        }
    });
    Ok((img, n))
}

fn covariate_image(raster: &CovariateRaster) -> image::RgbImage {
    let (lo, hi) = (raster.min_value(), raster.max_value());
    render(raster.extent, |i| stretch(raster.data[i], lo, hi))
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let args = Args::parse();
    let scheme = match &args.scheme {
        Some(p) => read_json::<ClassificationScheme>(p)?,
        None => ClassificationScheme::worldcover(),
    };

    let img = match &args.view {
        View::Classes { raster } => {
            let raster: CategoricalRaster = read_json(raster)?;
            for (code, cells) in raster.counts() {
                let name = scheme.lookup(code).unwrap_or("(unregistered)");
                println!("  {code:>5} {name:<28} {cells} cells");
            }
            classes_image(&raster, &scheme)
        }
        View::Change { before, after } => {
            let (img, n) = change_image(&read_json(before)?, &read_json(after)?, &scheme)?;
            println!("  {n} changed cells");
            img
        }
        View::Covariate { raster } => covariate_image(&read_json(raster)?),
    };

    if let Some(dir) = args.output.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("Cannot create {}", dir.display()))?;
    }
    img.save(&args.output).with_context(|| format!("Failed to save {}", args.output.display()))?;
    println!("Wrote {}", args.output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn north_row_is_drawn_on_top() {
        let scheme = ClassificationScheme::worldcover();
        // Row 0 (south) water, row 1 (north) tree cover.
        let raster = CategoricalRaster::from_values(GridExtent::unit(1, 2), vec![80, 10]).unwrap();
        let img = classes_image(&raster, &scheme);
        assert_eq!(img.get_pixel(0, 0).0, [0x00, 0x64, 0x00]);
        assert_eq!(img.get_pixel(0, 1).0, [0x00, 0x64, 0xc8]);
    }

    #[test]
    fn undefined_and_unknown_cells_are_black() {
        let scheme = ClassificationScheme::worldcover();
        let raster =
            CategoricalRaster::from_cells(GridExtent::unit(2, 1), vec![None, Some(999)]).unwrap();
        let img = classes_image(&raster, &scheme);
        assert_eq!(img.get_pixel(0, 0).0, NODATA_RGB);
        assert_eq!(img.get_pixel(1, 0).0, NODATA_RGB);
    }

    #[test]
    fn change_view_counts_and_marks_changes() {
        let scheme = ClassificationScheme::worldcover();
        let extent = GridExtent::unit(3, 1);
        let before = CategoricalRaster::from_values(extent, vec![10, 10, 40]).unwrap();
        let after = CategoricalRaster::from_values(extent, vec![10, 50, 40]).unwrap();
        let (img, n) = change_image(&before, &after, &scheme).unwrap();
        assert_eq!(n, 1);
        assert_eq!(img.get_pixel(1, 0).0, CHANGE_RGB);
        assert_ne!(img.get_pixel(0, 0).0, CHANGE_RGB);
    }

    #[test]
    fn change_view_rejects_misaligned_maps() {
        let scheme = ClassificationScheme::worldcover();
        let a = CategoricalRaster::filled(GridExtent::unit(2, 2), Some(10));
        let b = CategoricalRaster::filled(GridExtent::unit(3, 2), Some(10));
        assert!(change_image(&a, &b, &scheme).is_err());
    }

    #[test]
    fn stretch_maps_range_to_gray() {
        assert_eq!(stretch(0.0, 0.0, 10.0), [0, 0, 0]);
        assert_eq!(stretch(10.0, 0.0, 10.0), [255, 255, 255]);
        assert_eq!(stretch(f32::NAN, 0.0, 10.0), NODATA_RGB);
    }
}
