use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::{fs, io, path::PathBuf};
use validator::{Validate, ValidationError};

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("File {0} not found")]
    FileNotFound(String),

    #[error("Parsing error: {0}")]
    ParsingError(String),

    #[error("Validation errors: {0}")]
    ValidationError(String),

    #[error("Unknown error occurred: {0}")]
    Unknown(String),
}

/// One deployable service. `app_id` drives both the subnet address plan and
/// the listener-rule priority, so it has to be unique across the deployment.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ServiceEntry {
    #[validate(required)]
    pub app_name: Option<String>,

    #[validate(required)]
    pub app_id: Option<u32>,

    #[validate(required)]
    pub max_azs: Option<u32>,

    #[validate(required)]
    pub dns_record: Option<String>,

    /// Where the synthesized CloudFormation template is written.
    #[validate(custom = "validate_template_file")]
    pub template: PathBuf,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct Config {
    #[validate(required)]
    pub domain: Option<String>,

    /// Container images are referenced as `<registry_namespace>/<app_name>`.
    #[validate(required)]
    pub registry_namespace: Option<String>,

    pub region: Option<String>,

    pub services: Vec<ServiceEntry>,
}

pub fn parse(path: &PathBuf) -> Result<Config, Error> {
    let contents = match fs::read_to_string(path) {
        Ok(raw_contents) => Ok(raw_contents),
        Err(error) => match error.kind() {
            io::ErrorKind::NotFound => Err(Error::FileNotFound(path.display().to_string())),
            _ => Err(Error::Unknown(error.to_string())),
        },
    }?;

    let config: Config = match serde_yaml::from_str(&contents) {
        Ok(data) => Ok(data),
        Err(error) => Err(Error::ParsingError(error.to_string())),
    }?;

    match config.validate() {
        Ok(_) => (),
        Err(error) => return Err(Error::ValidationError(error.to_string())),
    }
    // Each app_id owns the 10.0.{app_id}.0/24 slice and the derived
    // listener-rule priority, so it must be unique across the deployment;
    // template paths must be unique or one service overwrites another.
    let mut seen_app_ids = HashSet::new();
    let mut seen_templates = HashSet::new();
    for service in &config.services {
        match service.validate() {
            Ok(_) => (),
            Err(error) => return Err(Error::ValidationError(error.to_string())),
        }

        if let Some(app_id) = service.app_id {
            if !seen_app_ids.insert(app_id) {
                return Err(Error::ValidationError(format!(
                    "app_id {} is used by more than one service",
                    app_id
                )));
            }
        }
        if !seen_templates.insert(service.template.clone()) {
            return Err(Error::ValidationError(format!(
                "template {} is used by more than one service",
                service.template.display()
            )));
        }
    }

    Ok(config)
}

fn validate_template_file(template_file: &PathBuf) -> Result<(), ValidationError> {
    let file_extension = match template_file.extension() {
        Some(extension) => extension,
        None => {
            return Err(ValidationError::new(
                "Unable to parse the extension of the template file location",
            ))
        }
    };
    if file_extension != "json" {
        return Err(ValidationError::new(
            "The template file location has to end with `.json`",
        ));
    }

    Ok(())
}
