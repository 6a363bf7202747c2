use std::path::PathBuf;

use crate::AppError;

use super::{load_properties, open_reader};

#[derive(Clone, Debug, clap::Args)]
#[clap(
    name = "stats",
    about = "Read a whole file through the read-ahead buffer and report \
             how often it reached the file"
)]
pub struct Stats {
    #[clap(value_parser, help = "The columnar file to read")]
    path: PathBuf,
    #[clap(long, help = "Read-ahead in bytes")]
    read_ahead: Option<usize>,
    #[clap(long, help = "JSON file with reader properties")]
    config: Option<PathBuf>,
}

impl Stats {
    pub fn run(&self) -> Result<(), AppError> {
        let mut properties = load_properties(&self.config)?;
        if let Some(read_ahead) = self.read_ahead {
            properties = properties.with_read_ahead(read_ahead);
        }

        let reader = open_reader(&self.path, Some(&properties))?;
        let num_row_groups = reader.metadata()?.num_row_groups()?;
        let mut values = 0;
        for index in 0..num_row_groups {
            values += reader
                .row_group(index)?
                .read_all()?
                .iter()
                .map(|column| column.len())
                .sum::<usize>();
        }
        reader.close()?;

        log::info!("stats: decoded {} values", values);
        if let Some(stats) = reader.read_stats() {
            println!("read-ahead: {} bytes", properties.read_ahead);
            println!("underlying reads: {}", stats.underlying_reads());
            println!("bytes fetched: {}", stats.bytes_fetched());
            println!("buffer hits: {}", stats.buffer_hits());
        }
        Ok(())
    }
}
