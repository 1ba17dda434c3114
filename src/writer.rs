use std::fs;
use std::path::PathBuf;

use serde_json::Value;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Unable to write {0}: {1}")]
    WriteError(String, std::io::Error),
}

pub fn write_template(path: &PathBuf, template: &Value) -> Result<(), Error> {
    let file_contents = serde_json::to_string_pretty(template)?;
    fs::write(path, file_contents)
        .map_err(|error| Error::WriteError(path.display().to_string(), error))
}
