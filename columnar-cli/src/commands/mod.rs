use std::path::{Path, PathBuf};

use clap::Subcommand;
use columnar_bridge::{FileSource, ParquetFileReader, ReaderProperties};

use crate::AppError;

mod cat;
mod inspect;
mod stats;

#[derive(Debug, Subcommand)]
pub enum Commands {
    Inspect(inspect::Inspect),
    Cat(cat::Cat),
    Stats(stats::Stats),
}

impl Commands {
    pub fn run(&self) -> Result<(), AppError> {
        match self {
            Commands::Inspect(inspect) => inspect.run(),
            Commands::Cat(cat) => cat.run(),
            Commands::Stats(stats) => stats.run(),
        }
    }
}

/// Open `path` directly, or through a managed source when reader
/// properties are given.
fn open_reader(
    path: &Path,
    properties: Option<&ReaderProperties>,
) -> Result<ParquetFileReader, AppError> {
    let opened = match properties {
        None => ParquetFileReader::open(path),
        Some(properties) => FileSource::open(path).and_then(|source| {
            ParquetFileReader::from_source(source, properties)
        }),
    };
    opened.map_err(|source| AppError::Open {
        path: path.display().to_string(),
        source,
    })
}

fn load_properties(
    config: &Option<PathBuf>,
) -> Result<ReaderProperties, AppError> {
    match config {
        Some(path) => ReaderProperties::from_json_file(path)
            .map_err(AppError::Properties),
        None => Ok(ReaderProperties::default()),
    }
}
