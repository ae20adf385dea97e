//! `traeky config`: paths and effective settings

use crate::app::Traeky;
use crate::error::TraekyResult;

/// Show current configuration and paths
pub fn handle_config_command(app: &Traeky) -> TraekyResult<()> {
    let paths = app.paths();
    let settings = app.settings();

    println!("Traeky Configuration");
    println!("====================");
    println!("Base directory:      {}", paths.base_dir().display());
    println!("Store directory:     {}", paths.store_dir().display());
    println!("Downloads directory: {}", paths.downloads_dir().display());
    println!("Settings file:       {}", paths.settings_file().display());
    println!();
    println!("Settings:");
    println!("  Language:          {}", settings.lang);
    println!("  Mode:              {}", settings.mode);
    println!("  File format:       {:?}", settings.db_format);
    println!("  Auto-save delay:   {} ms", settings.autosave_debounce_ms);
    println!(
        "  Linked file:       {}",
        app.engine()
            .linked_file()
            .map(|l| l.path.display().to_string())
            .unwrap_or_else(|| "(none)".to_string())
    );

    let legacy = app.vault().pins().legacy();
    let state = |set: bool| if set { "configured" } else { "not set" };
    println!("  Legacy salt:       {}", state(legacy.global_salt.is_some()));
    println!("  Legacy app key:    {}", state(legacy.app_key.is_some()));

    Ok(())
}
