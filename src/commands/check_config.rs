//! `fixity check-config`

use anyhow::Result;
use std::path::Path;

use crate::config::{FixityConfig, default_config_path};
use crate::ui;

pub fn execute(config: &FixityConfig, path: Option<&Path>) -> Result<()> {
    match path.map(Path::to_path_buf).or_else(default_config_path) {
        Some(path) if path.is_file() => println!("Config: {}", path.display()),
        _ => println!("Config: (defaults)"),
    }

    let validation = config.validate()?;
    ui::print_warning_box("Configuration warnings", &validation.warnings);

    println!("Configuration OK");
    Ok(())
}
