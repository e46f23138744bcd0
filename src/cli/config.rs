use crate::config::generate::generate_starter_config;
use crate::config::user_config_path;
use std::fs;
use std::path::{Path, PathBuf};

pub fn init(stdout: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_content = generate_starter_config();

    if stdout {
        print!("{}", config_content);
        return Ok(());
    }

    let config_path = user_config_path()
        .and_then(|path| match path.parent().map(fs::create_dir_all) {
            Some(Ok(())) => Some(path),
            Some(Err(e)) => {
                eprintln!("Warning: Could not create directory for {}: {}", path.display(), e);
                eprintln!("Falling back to /etc/gather/config.yml");
                None
            }
            None => None,
        })
        .unwrap_or_else(|| PathBuf::from("/etc/gather/config.yml"));

    write_config_file(&config_path, &config_content)?;
    println!("Config file created at: {}", config_path.display());
    println!("Set OPENWEATHER_API_KEY (or edit worker.provider.api_key) before running.");

    Ok(())
}

/// Write `content` to `path`, refusing to overwrite an existing file
pub fn write_config_file(path: &Path, content: &str) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        return Err(format!(
            "Config file already exists at {}. Remove it first or use --stdout.",
            path.display()
        )
        .into());
    }

    fs::write(path, content).map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;
    Ok(())
}
