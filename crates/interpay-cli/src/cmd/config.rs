//! `interpay config`.

use crate::ui;
use interpay_types::config::SessionConfig;
use std::path::Path;

pub fn cmd_config(config: &SessionConfig, path: Option<&Path>) -> Result<(), String> {
    let rendered =
        toml::to_string_pretty(config).map_err(|e| format!("Cannot render config: {e}"))?;
    let source = path
        .map(Path::to_path_buf)
        .unwrap_or_else(crate::config::default_config_path);

    ui::section("Effective configuration");
    let label = if source.exists() { "File" } else { "File (absent)" };
    ui::kv(label, &source.display().to_string());
    ui::blank();
    println!("{rendered}");
    Ok(())
}
