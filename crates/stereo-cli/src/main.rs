use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use clap::Parser;
use image::{GrayImage, Rgb, RgbImage};
use log::{info, warn};
use stereo_core::Pt2;
use stereo_pipeline::{CameraSide, DebugSink, PipelineConfig, StereoSession};

/// Stereo calibration from checkerboard image pairs.
#[derive(Debug, Parser)]
#[command(author, version, about = "Stereo calibration, rectification and disparity")]
struct Args {
    /// Directory of left-camera images (sorted by file name).
    #[arg(long)]
    left_dir: PathBuf,

    /// Directory of right-camera images, paired by sorted position.
    #[arg(long)]
    right_dir: PathBuf,

    /// Interior corners per board row; overrides the config.
    #[arg(long)]
    board_width: Option<usize>,

    /// Interior corners per board column; overrides the config.
    #[arg(long)]
    board_height: Option<usize>,

    /// JSON pipeline config. Defaults are used if omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Where to write the calibration record.
    #[arg(long, default_value = "stereo_calibration.json")]
    output: PathBuf,

    /// Write a normalized disparity PNG per pair into this directory.
    #[arg(long)]
    disparity_dir: Option<PathBuf>,

    /// Write detected-corner overlays into this directory.
    #[arg(long)]
    show_corners: Option<PathBuf>,
}

/// What a run produced.
#[derive(Debug)]
struct Summary {
    pairs: usize,
    used: usize,
    rms: f64,
    epipolar_error: f64,
    disparity_images: Vec<PathBuf>,
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| matches!(e.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();
    Ok(paths)
}

fn load_gray(path: &Path) -> Result<GrayImage> {
    Ok(image::open(path)
        .with_context(|| format!("loading {}", path.display()))?
        .to_luma8())
}

fn load_pairs(left_dir: &Path, right_dir: &Path) -> Result<Vec<(GrayImage, GrayImage)>> {
    let left = list_images(left_dir)?;
    let right = list_images(right_dir)?;
    ensure!(
        left.len() == right.len(),
        "{} left images but {} right images",
        left.len(),
        right.len()
    );
    ensure!(!left.is_empty(), "no images in {}", left_dir.display());
    left.iter()
        .zip(&right)
        .map(|(l, r)| Ok((load_gray(l)?, load_gray(r)?)))
        .collect()
}

/// Draws detected corners on the image and saves one PNG per camera and frame.
struct CornerOverlay {
    dir: PathBuf,
}

impl DebugSink for CornerOverlay {
    fn corners(&self, frame: usize, side: CameraSide, image: &GrayImage, corners: &[Pt2]) {
        let mut canvas = RgbImage::from_fn(image.width(), image.height(), |x, y| {
            let v = image.get_pixel(x, y)[0];
            Rgb([v, v, v])
        });
        for (idx, c) in corners.iter().enumerate() {
            // First corner red, the rest green, so the orientation is visible.
            let color = if idx == 0 { Rgb([255, 0, 0]) } else { Rgb([0, 255, 0]) };
            let (cx, cy) = (c.x.round() as i64, c.y.round() as i64);
            for d in -3..=3i64 {
                for (x, y) in [(cx + d, cy), (cx, cy + d)] {
                    if x >= 0 && y >= 0 && (x as u32) < canvas.width() && (y as u32) < canvas.height() {
                        canvas.put_pixel(x as u32, y as u32, color);
                    }
                }
            }
        }
        let side = match side {
            CameraSide::Left => "left",
            CameraSide::Right => "right",
        };
        let path = self.dir.join(format!("corners_{frame:03}_{side}.png"));
        if let Err(e) = canvas.save(&path) {
            warn!("could not write {}: {e}", path.display());
        }
    }
}

fn run(args: &Args) -> Result<Summary> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(w) = args.board_width {
        config.pattern.board_width = w;
    }
    if let Some(h) = args.board_height {
        config.pattern.board_height = h;
    }
    config.validate()?;

    let pairs = load_pairs(&args.left_dir, &args.right_dir)?;
    info!("loaded {} image pairs", pairs.len());

    let mut session = StereoSession::new(config);
    if let Some(dir) = &args.show_corners {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        session = session.with_sink(Box::new(CornerOverlay { dir: dir.clone() }));
    }

    let calib = session.calibrate(&pairs)?;
    calib.record().save_json(&args.output)?;
    info!("calibration written to {}", args.output.display());

    let mut disparity_images = Vec::new();
    if let Some(dir) = &args.disparity_dir {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        for (idx, (left, right)) in pairs.iter().enumerate() {
            let out = session.process_pair(&calib.rectification, idx, left, right)?;
            let path = dir.join(format!("disparity_{idx:03}.png"));
            out.disparity
                .to_normalized_u8()
                .save(&path)
                .with_context(|| format!("writing {}", path.display()))?;
            disparity_images.push(path);
        }
    }

    Ok(Summary {
        pairs: pairs.len(),
        used: calib.detections.frames.len(),
        rms: calib.stereo.rms,
        epipolar_error: calib.epipolar_error,
        disparity_images,
    })
}

fn main() {
    pretty_env_logger::init_timed();
    let args = Args::parse();
    match run(&args) {
        Ok(summary) => {
            println!(
                "used {}/{} pairs, stereo rms {:.4} px, epipolar error {:.4} px",
                summary.used, summary.pairs, summary.rms, summary.epipolar_error
            );
            if !summary.disparity_images.is_empty() {
                println!("wrote {} disparity images", summary.disparity_images.len());
            }
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stereo_core::synthetic::planar;
    use stereo_core::synthetic::render::{render_checkerboard, BoardShading};
    use stereo_core::{FxFyCxCySkew, ImageSize, Iso3, PatternGeometry, PinholeCamera};
    use stereo_pipeline::CalibrationRecord;
    use tempfile::TempDir;

    fn write_pairs(left: &Path, right: &Path, count: usize) {
        let camera = PinholeCamera::ideal(FxFyCxCySkew::new(350.0, 350.0, 160.0, 120.0));
        let rig = Iso3::translation(-2.0, 0.0, 0.0);
        let pattern = PatternGeometry::new(6, 9);
        let size = ImageSize::new(320, 240);
        for (idx, pose) in planar::varied_board_poses(&pattern, count, 24.0)
            .iter()
            .enumerate()
        {
            let shading = BoardShading::default();
            render_checkerboard(&camera, pose, &pattern, size, 2, shading)
                .save(left.join(format!("{idx:02}.png")))
                .unwrap();
            render_checkerboard(&camera, &(rig * pose), &pattern, size, 2, shading)
                .save(right.join(format!("{idx:02}.png")))
                .unwrap();
        }
    }

    fn args(root: &Path) -> Args {
        Args {
            left_dir: root.join("left"),
            right_dir: root.join("right"),
            board_width: Some(6),
            board_height: Some(9),
            config: None,
            output: root.join("calib.json"),
            disparity_dir: Some(root.join("disparity")),
            show_corners: Some(root.join("corners")),
        }
    }

    #[test]
    fn images_are_listed_in_name_order() {
        let dir = TempDir::new().unwrap();
        for name in ["b.png", "a.PNG", "c.jpg", "notes.txt"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        let names: Vec<String> = list_images(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.PNG", "b.png", "c.jpg"]);
    }

    #[test]
    fn full_run_writes_record_and_images() {
        let root = TempDir::new().unwrap();
        let a = args(root.path());
        fs::create_dir_all(&a.left_dir).unwrap();
        fs::create_dir_all(&a.right_dir).unwrap();
        write_pairs(&a.left_dir, &a.right_dir, 10);

        let summary = run(&a).unwrap();
        assert_eq!(summary.pairs, 10);
        assert!(summary.used >= 8, "used {}", summary.used);
        assert!(summary.epipolar_error < 0.5);
        assert_eq!(summary.disparity_images.len(), 10);
        assert!(summary.disparity_images.iter().all(|p| p.exists()));
        let overlays = fs::read_dir(root.path().join("corners")).unwrap().count();
        assert_eq!(overlays, 2 * summary.used);

        let record = CalibrationRecord::load_json(&a.output).unwrap();
        assert_eq!(record.image_size, ImageSize::new(320, 240));
        assert!((record.translation.norm() - 2.0).abs() < 0.1);
    }

    #[test]
    fn unequal_image_counts_are_rejected() {
        let root = TempDir::new().unwrap();
        let a = args(root.path());
        fs::create_dir_all(&a.left_dir).unwrap();
        fs::create_dir_all(&a.right_dir).unwrap();
        GrayImage::new(8, 8).save(a.left_dir.join("0.png")).unwrap();
        let err = run(&a).unwrap_err();
        assert!(err.to_string().contains("1 left images but 0 right images"));
    }
}
