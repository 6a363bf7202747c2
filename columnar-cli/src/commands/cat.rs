use std::path::PathBuf;

use columnar_bridge::ColumnValues;

use crate::AppError;

use super::open_reader;

#[derive(Clone, Debug, clap::Args)]
#[clap(name = "cat", about = "Print the rows of a file, tab separated")]
pub struct Cat {
    #[clap(value_parser, help = "The columnar file to print")]
    path: PathBuf,
    #[clap(long, short, help = "Only print this row group")]
    row_group: Option<usize>,
    #[clap(long, short = 'n', help = "Stop after this many rows")]
    limit: Option<usize>,
}

impl Cat {
    pub fn run(&self) -> Result<(), AppError> {
        let reader = open_reader(&self.path, None)?;
        let metadata = reader.metadata()?;
        let num_row_groups = metadata.num_row_groups()?;

        let groups = match self.row_group {
            Some(index) if index >= num_row_groups => {
                return Err(AppError::NoSuchRowGroup(index))
            }
            Some(index) => index..index + 1,
            None => 0..num_row_groups,
        };

        let schema = metadata.schema()?;
        let header: Vec<&str> =
            schema.columns().iter().map(|c| c.name.as_str()).collect();
        println!("{}", header.join("\t"));

        let mut remaining = self.limit.unwrap_or(usize::MAX);
        for index in groups {
            if remaining == 0 {
                break;
            }
            let columns = reader.row_group(index)?.read_all()?;
            remaining -= print_rows(&columns, remaining);
        }
        Ok(())
    }
}

/// Print up to `limit` rows and return how many were printed.
fn print_rows(columns: &[ColumnValues], limit: usize) -> usize {
    let rows = columns.first().map_or(0, ColumnValues::len).min(limit);
    for row in 0..rows {
        let line: Vec<String> = columns
            .iter()
            .map(|column| column.display_at(row).unwrap_or_default())
            .collect();
        println!("{}", line.join("\t"));
    }
    rows
}
