use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

pub const MANIFEST_FILE_NAME: &str = "Run_Manifest.jsonl";

/// One line of the run manifest, describing a processed file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestLine {
    pub file: String,
    pub source_shape: [usize; 2],
    pub normalized_shape: [usize; 2],
    pub truncated_frames: usize,
    pub total_rank: usize,
    pub retained_rank: usize,
    pub max_singular_value: f64,
    pub threshold: f64,
    pub reconstructed_samples: usize,
}

/// Append-only JSONL writer for [`ManifestLine`]s.
pub struct ManifestWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    lines: usize,
}

impl ManifestWriter {
    pub fn create(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE_NAME);
        let file = File::create(&path).map_err(|e| PipelineError::io(&path, e))?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            lines: 0,
        })
    }

    pub fn append(&mut self, line: &ManifestLine) -> Result<()> {
        serde_json::to_writer(&mut self.writer, line).map_err(|source| {
            PipelineError::Manifest {
                path: self.path.clone(),
                source,
            }
        })?;
        self.writer
            .write_all(b"\n")
            .map_err(|e| PipelineError::io(&self.path, e))?;
        self.lines += 1;
        Ok(())
    }

    /// Flush and return the manifest path and line count.
    pub fn finish(mut self) -> Result<(PathBuf, usize)> {
        self.writer
            .flush()
            .map_err(|e| PipelineError::io(&self.path, e))?;
        Ok((self.path, self.lines))
    }
}

/// Read a manifest back, one entry per non-empty line.
pub fn read_manifest(path: &Path) -> Result<Vec<ManifestLine>> {
    let text = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line).map_err(|source| PipelineError::Manifest {
                path: path.to_path_buf(),
                source,
            })
        })
        .collect()
}
