mod logging;

use std::sync::Arc;

use dbscope_adapters::HttpCatalogClient;
use dbscope_core::settings::{default_log_path, Settings, SettingsFile};
use tracing::{error, info};

fn run_app(
    settings: &Settings,
    run_tui: impl FnOnce(Arc<HttpCatalogClient>, &Settings) -> Result<(), dbscope_tui::TuiError>,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = HttpCatalogClient::from_settings(settings)?;
    info!(
        base_url = client.base_url(),
        datasources = settings.datasources.len(),
        "starting dbscope"
    );
    run_tui(Arc::new(client), settings)?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let log_path = default_log_path()?;
    if let Err(error) = logging::init(&log_path) {
        eprintln!("logging disabled, cannot open {}: {error}", log_path.display());
    }

    let settings_file = SettingsFile::load_default()?;
    info!(path = %settings_file.path().display(), "loaded settings");

    let result = run_app(settings_file.settings(), dbscope_tui::run);
    if let Err(error) = &result {
        error!(%error, "dbscope exited with an error");
    }
    result
}

#[cfg(test)]
mod tests {
    use std::io;

    use dbscope_core::settings::Settings;

    use super::run_app;

    #[test]
    fn run_app_hands_configured_client_to_tui() {
        let settings = Settings {
            base_url: "http://catalog.internal:9000/".to_string(),
            ..Settings::default()
        };

        let result = run_app(&settings, |client, settings| {
            assert_eq!(client.base_url(), "http://catalog.internal:9000");
            assert_eq!(settings.sample_limit, 20);
            Ok(())
        });
        assert!(result.is_ok());
    }

    #[test]
    fn run_app_propagates_tui_errors() {
        let result = run_app(&Settings::default(), |_, _| {
            Err(dbscope_tui::TuiError::Io(io::Error::other("boom")))
        });
        assert!(result.is_err());
    }
}
