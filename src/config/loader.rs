//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::RouteConfig;
use super::secret::secret_string;
use crate::domain::errors::RouteError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into RouteConfig
/// 4. Applies environment variable overrides (SCANROUTE_* prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns an error if:
/// - File cannot be read
/// - TOML parsing fails
/// - A referenced environment variable is not set
/// - Configuration validation fails
///
/// # Examples
///
/// ```no_run
/// use scanroute::config::loader::load_config;
///
/// let config = load_config("scanroute.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<RouteConfig> {
    let config = read_config(path)?;

    config.validate().map_err(|e| {
        RouteError::Configuration(format!("Configuration validation failed: {}", e))
    })?;

    Ok(config)
}

/// Like [`load_config`] but without the validation pass
///
/// Commands use this to apply CLI overrides (such as `--dry-run`, which
/// relaxes credential checks) before calling [`RouteConfig::validate`].
pub fn read_config(path: impl AsRef<Path>) -> Result<RouteConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(RouteError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        RouteError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    let contents = substitute_env_vars(&contents)?;

    let mut config: RouteConfig = toml::from_str(&contents)
        .map_err(|e| RouteError::Configuration(format!("Failed to parse TOML: {}", e)))?;

    apply_env_overrides(&mut config)?;

    Ok(config)
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// Comment lines are copied through untouched.
///
/// # Errors
///
/// Returns an error if a referenced environment variable is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| RouteError::Configuration(format!("Invalid substitution pattern: {e}")))?;
    let mut result = String::with_capacity(input.len());
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let processed = re.replace_all(line, |caps: &regex::Captures<'_>| {
            let var_name = &caps[1];
            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                    caps[0].to_string()
                }
            }
        });
        result.push_str(&processed);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(RouteError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Applies environment variable overrides using the SCANROUTE_* prefix
///
/// Environment variables follow the pattern: SCANROUTE_<SECTION>_<KEY>
/// For example: SCANROUTE_WATCH_ROOT, SCANROUTE_UPLOAD_CONCURRENCY
fn apply_env_overrides(config: &mut RouteConfig) -> Result<()> {
    // Application overrides
    if let Ok(val) = std::env::var("SCANROUTE_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }
    if let Ok(val) = std::env::var("SCANROUTE_APPLICATION_DRY_RUN") {
        config.application.dry_run = val.parse().unwrap_or(false);
    }
    if let Ok(val) = std::env::var("SCANROUTE_APPLICATION_LAB_NAME") {
        config.application.lab_name = val;
    }

    // Watch overrides
    if let Ok(val) = std::env::var("SCANROUTE_WATCH_ROOT") {
        config.watch.root = val;
    }
    if let Some(depth) = env_parse("SCANROUTE_WATCH_DEPTH") {
        config.watch.depth = depth;
    }
    if let Some(interval) = env_parse("SCANROUTE_WATCH_POLL_INTERVAL_SECS") {
        config.watch.poll_interval_secs = interval;
    }
    if let Some(settle) = env_parse("SCANROUTE_WATCH_SETTLE_SECONDS") {
        config.watch.settle_seconds = settle;
    }

    // Ledger overrides
    if let Ok(val) = std::env::var("SCANROUTE_LEDGER_PATH") {
        config.ledger.path = val;
    }

    // Upload overrides
    if let Some(concurrency) = env_parse("SCANROUTE_UPLOAD_CONCURRENCY") {
        config.upload.concurrency = concurrency;
    }
    if let Some(chunk) = env_parse("SCANROUTE_UPLOAD_CHUNK_SIZE_MB") {
        config.upload.chunk_size_mb = chunk;
    }

    // Retry overrides
    if let Some(attempts) = env_parse("SCANROUTE_RETRY_MAX_ATTEMPTS") {
        config.retry.max_attempts = attempts;
    }

    // Dropbox overrides
    if let Ok(val) = std::env::var("SCANROUTE_DROPBOX_ROOT") {
        config.dropbox.root = val;
    }
    if let Ok(val) = std::env::var("SCANROUTE_DROPBOX_ACCESS_TOKEN") {
        config.dropbox.access_token = Some(secret_string(val));
    }
    if let Ok(val) = std::env::var("SCANROUTE_DROPBOX_REFRESH_TOKEN") {
        config.dropbox.refresh_token = Some(secret_string(val));
    }
    if let Ok(val) = std::env::var("SCANROUTE_DROPBOX_APP_KEY") {
        config.dropbox.app_key = Some(val);
    }
    if let Ok(val) = std::env::var("SCANROUTE_DROPBOX_APP_SECRET") {
        config.dropbox.app_secret = Some(secret_string(val));
    }

    // Shopify overrides
    if let Ok(val) = std::env::var("SCANROUTE_SHOPIFY_SHOP") {
        config.shopify.shop = val;
    }
    if let Ok(val) = std::env::var("SCANROUTE_SHOPIFY_ADMIN_TOKEN") {
        config.shopify.admin_token = Some(secret_string(val));
    }
    if let Ok(val) = std::env::var("SCANROUTE_SHOPIFY_API_VERSION") {
        config.shopify.api_version = val;
    }

    // Pipeline overrides
    if let Ok(val) = std::env::var("SCANROUTE_PIPELINE_AUTO_TAGS") {
        config.pipeline.auto_tags = crate::domain::parse_tags(&val);
    }

    // Logging overrides
    if let Ok(val) = std::env::var("SCANROUTE_LOGGING_LOCAL_ENABLED") {
        config.logging.local_enabled = val.parse().unwrap_or(true);
    }
    if let Ok(val) = std::env::var("SCANROUTE_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serializes tests that touch the process environment
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn test_substitute_env_vars() {
        let _guard = ENV_MUTEX.lock().unwrap();
        std::env::set_var("SCANROUTE_TEST_TOKEN", "sl.abc");

        let out = substitute_env_vars("access_token = \"${SCANROUTE_TEST_TOKEN}\"").unwrap();
        assert_eq!(out.trim(), "access_token = \"sl.abc\"");

        std::env::remove_var("SCANROUTE_TEST_TOKEN");
    }

    #[test]
    fn test_substitute_skips_comments() {
        let out = substitute_env_vars("# token = \"${SCANROUTE_NOT_SET_ANYWHERE}\"").unwrap();
        assert!(out.contains("${SCANROUTE_NOT_SET_ANYWHERE}"));
    }

    #[test]
    fn test_substitute_reports_missing() {
        let err = substitute_env_vars("a = \"${SCANROUTE_MISSING_ONE}\"\nb = \"${SCANROUTE_MISSING_ONE}\"")
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("SCANROUTE_MISSING_ONE"));
        assert_eq!(msg.matches("SCANROUTE_MISSING_ONE").count(), 1);
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_config("/nonexistent/scanroute.toml").unwrap_err();
        assert!(matches!(err, RouteError::Configuration(_)));
    }
}
