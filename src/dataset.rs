use std::path::{Path, PathBuf};

use anyhow::{bail, Context as AnyhowContext, Result};
use log::{debug, info};

use crate::image::Frame;

/// Image files of one directory, played back in file name order.
pub struct Dataset {
    paths: Vec<PathBuf>,
    index: usize,
    pub length: u64,
}

pub struct InputFrame {
    pub path: PathBuf,
    /// position in the sequence, starting at 0
    pub index: usize,
    pub frame: Frame,
}

/// Lower case extension without the leading dot, so `.PNG` and `png` match.
fn normalize_extension(extension: &str) -> String {
    extension.trim_start_matches('.').to_ascii_lowercase()
}

impl Dataset {
    pub fn new(path: &Path, extension: &str) -> Result<Dataset> {
        if !path.is_dir() {
            bail!("Invalid input directory {}", path.display());
        }
        let extension = normalize_extension(extension);
        let mut paths = vec![];
        for entry in std::fs::read_dir(path)
            .with_context(|| format!("Failed to list {}", path.display()))?
        {
            let entry = entry?;
            let file_path = entry.path();
            if !entry.file_type()?.is_file() {
                continue;
            }
            let matches = file_path
                .extension()
                .and_then(|e| e.to_str())
                .map_or(false, |e| normalize_extension(e) == extension);
            if matches {
                paths.push(file_path);
            } else {
                debug!("skipping {}", file_path.display());
            }
        }
        paths.sort();
        info!("Found {} *.{} files in {}", paths.len(), extension, path.display());

        Ok(Dataset {
            length: paths.len() as u64,
            paths,
            index: 0,
        })
    }

    /// Load the next frame as RGB. A file that does not decode ends the run.
    pub fn next(&mut self) -> Result<Option<InputFrame>> {
        let Some(path) = self.paths.get(self.index) else {
            return Ok(None);
        };
        let image = ::image::open(path)
            .with_context(|| format!("Failed to decode {}", path.display()))?
            .to_rgb8();
        let (width, height) = image.dimensions();
        let frame = Frame::rgb(image.into_raw(), width as usize, height as usize)?;

        let input = InputFrame {
            path: path.clone(),
            index: self.index,
            frame,
        };
        self.index += 1;
        Ok(Some(input))
    }
}
