use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use image_processors_rs::{is_supported_image_format, load_image, ImageProcessor, PreprocessOverrides, PreprocessedImage};
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use rayon::prelude::*;
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RunSummary {
    pub(crate) processed: usize,
    pub(crate) failed: usize,
}

pub(crate) struct ProgressTracker {
    progress_bar: ProgressBar,
    image_paths: Vec<PathBuf>,
}

impl ProgressTracker {
    pub(crate) fn new(input_dir: &Path) -> Result<Self> {
        let mut image_paths: Vec<_> = WalkDir::new(input_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| is_supported_image_format(e.path()))
            .map(|e| e.into_path())
            .collect();
        image_paths.sort();

        let progress_bar = ProgressBar::new(image_paths.len() as u64);
        progress_bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec} {eta})",
            )?
            .progress_chars("#>-"),
        );

        Ok(Self {
            progress_bar,
            image_paths,
        })
    }

    pub(crate) fn image_count(&self) -> usize {
        self.image_paths.len()
    }

    /// Preprocess every image on the global rayon pool. Failures are logged
    /// and counted, never fatal for the rest of the run.
    pub(crate) fn process_images(&self, processor: &ImageProcessor) -> RunSummary {
        let failed = AtomicUsize::new(0);

        self.image_paths
            .par_iter()
            .progress_with(self.progress_bar.clone())
            .for_each(|path| match process_image(path, processor) {
                Ok(result) => {
                    tracing::info!(
                        path = %path.display(),
                        original_size = ?result.original_size,
                        reshaped_input_size = ?result.reshaped_input_size,
                        shape = ?result.pixel_values.shape(),
                        "preprocessed image"
                    );
                }
                Err(e) => {
                    failed.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(path = %path.display(), error = %format!("{e:#}"), "failed to preprocess image");
                }
            });
        self.progress_bar.finish();

        let failed = failed.into_inner();
        RunSummary {
            processed: self.image_paths.len() - failed,
            failed,
        }
    }
}

fn process_image(path: &Path, processor: &ImageProcessor) -> Result<PreprocessedImage> {
    let image = load_image(path).with_context(|| format!("Failed to open image: {}", path.display()))?;
    processor
        .preprocess(&image, &PreprocessOverrides::default())
        .with_context(|| format!("Failed to preprocess image: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    #[test]
    fn test_collects_and_processes_images() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let nested = temp_dir.path().join("nested");
        std::fs::create_dir_all(&nested)?;

        RgbImage::from_pixel(4, 3, Rgb([255, 0, 0])).save(temp_dir.path().join("a.png"))?;
        RgbImage::from_pixel(2, 2, Rgb([0, 255, 0])).save(nested.join("b.png"))?;
        std::fs::write(temp_dir.path().join("notes.txt"), "not an image")?;
        std::fs::write(temp_dir.path().join("broken.png"), "not a png either")?;

        let tracker = ProgressTracker::new(temp_dir.path())?;
        assert_eq!(tracker.image_count(), 3);

        let processor = ImageProcessor::from_json(r#"{"size": {"height": 8, "width": 8}}"#)?;
        let summary = tracker.process_images(&processor);
        assert_eq!(
            summary,
            RunSummary {
                processed: 2,
                failed: 1
            }
        );
        Ok(())
    }
}
