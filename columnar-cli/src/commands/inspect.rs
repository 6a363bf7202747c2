use std::path::PathBuf;

use crate::AppError;

use super::open_reader;

#[derive(Clone, Debug, clap::Args)]
#[clap(name = "inspect", about = "Print the metadata and schema of a file")]
pub struct Inspect {
    #[clap(value_parser, help = "The columnar file to inspect")]
    path: PathBuf,
    #[clap(long, action, help = "Print the schema as JSON")]
    json: bool,
}

impl Inspect {
    pub fn run(&self) -> Result<(), AppError> {
        let reader = open_reader(&self.path, None)?;
        let metadata = reader.metadata()?;
        let schema = metadata.schema()?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&schema)?);
            return Ok(());
        }

        println!("rows: {}", metadata.num_rows()?);
        println!("row groups: {}", metadata.num_row_groups()?);
        if let Some(created_by) = metadata.created_by()? {
            println!("created by: {}", created_by);
        }
        for (index, column) in schema.columns().iter().enumerate() {
            let repetition = if column.nullable {
                "optional"
            } else {
                "required"
            };
            println!(
                "  {:>3} {} {} {}",
                index, column.name, column.kind, repetition
            );
        }
        Ok(())
    }
}
