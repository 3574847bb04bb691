use anyhow::{Context, Result};
use clap::Parser;
use std::{env, path::PathBuf, str::FromStr};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    /// Bucket the handlers operate on.
    pub bucket: String,
    pub region: String,
    /// Root under which per-invocation scratch directories are created.
    pub scratch_dir: PathBuf,
    /// Collection whose document ids are the valid folder owners.
    pub owners_collection: String,
    /// Key prefix whose immediate sub-folders are owner folders.
    pub folders_root: String,
    /// Keys requested per listing page.
    pub list_page_size: usize,
    /// Objects derived concurrently during a batch sweep.
    pub sweep_concurrency: usize,
    pub messaging_endpoint: String,
    pub messaging_api_key: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            storage_dir: "./data/objects".into(),
            database_url: "sqlite://./data/meta/media_functions.db".into(),
            bucket: "media-functions-default".into(),
            region: "europe-west1".into(),
            scratch_dir: env::temp_dir().join("media-functions"),
            owners_collection: "users".into(),
            folders_root: "users/".into(),
            list_page_size: 1000,
            sweep_concurrency: 1,
            messaging_endpoint: "http://127.0.0.1:8085/v1/messages:send".into(),
            messaging_api_key: None,
        }
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Image derivation and storage housekeeping functions")]
pub struct Args {
    /// Host to bind to (overrides MEDIA_FUNCTIONS_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides MEDIA_FUNCTIONS_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where object payloads are stored (overrides MEDIA_FUNCTIONS_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides MEDIA_FUNCTIONS_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Bucket to process (overrides MEDIA_FUNCTIONS_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Region label (overrides MEDIA_FUNCTIONS_REGION)
    #[arg(long)]
    pub region: Option<String>,

    /// Scratch root for temporary files (overrides MEDIA_FUNCTIONS_SCRATCH_DIR)
    #[arg(long)]
    pub scratch_dir: Option<PathBuf>,

    /// Owner collection in the document store (overrides MEDIA_FUNCTIONS_OWNERS_COLLECTION)
    #[arg(long)]
    pub owners_collection: Option<String>,

    /// Prefix holding per-owner folders (overrides MEDIA_FUNCTIONS_FOLDERS_ROOT)
    #[arg(long)]
    pub folders_root: Option<String>,

    /// Listing page size, 1-1000 (overrides MEDIA_FUNCTIONS_LIST_PAGE_SIZE)
    #[arg(long)]
    pub list_page_size: Option<usize>,

    /// Concurrent derivations during a batch sweep (overrides MEDIA_FUNCTIONS_SWEEP_CONCURRENCY)
    #[arg(long)]
    pub sweep_concurrency: Option<usize>,

    /// Push gateway endpoint (overrides MEDIA_FUNCTIONS_MESSAGING_ENDPOINT)
    #[arg(long)]
    pub messaging_endpoint: Option<String>,

    /// Bearer key for the push gateway (overrides MEDIA_FUNCTIONS_MESSAGING_API_KEY)
    #[arg(long)]
    pub messaging_api_key: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::merge(args)?, migrate))
    }

    /// CLI values win, then `MEDIA_FUNCTIONS_*` environment variables, then defaults.
    pub fn merge(args: Args) -> Result<Self> {
        let defaults = Self::default();

        let list_page_size = pick_parsed(args.list_page_size, "LIST_PAGE_SIZE")?
            .unwrap_or(defaults.list_page_size)
            .clamp(1, 1000);
        let sweep_concurrency = pick_parsed(args.sweep_concurrency, "SWEEP_CONCURRENCY")?
            .unwrap_or(defaults.sweep_concurrency)
            .max(1);

        let mut folders_root = pick(args.folders_root, "FOLDERS_ROOT").unwrap_or(defaults.folders_root);
        if !folders_root.is_empty() && !folders_root.ends_with('/') {
            folders_root.push('/');
        }

        Ok(Self {
            host: pick(args.host, "HOST").unwrap_or(defaults.host),
            port: pick_parsed(args.port, "PORT")?.unwrap_or(defaults.port),
            storage_dir: pick(args.storage_dir, "STORAGE_DIR").unwrap_or(defaults.storage_dir),
            database_url: pick(args.database_url, "DATABASE_URL").unwrap_or(defaults.database_url),
            bucket: pick(args.bucket, "BUCKET").unwrap_or(defaults.bucket),
            region: pick(args.region, "REGION").unwrap_or(defaults.region),
            scratch_dir: args
                .scratch_dir
                .or_else(|| pick(None, "SCRATCH_DIR").map(PathBuf::from))
                .unwrap_or(defaults.scratch_dir),
            owners_collection: pick(args.owners_collection, "OWNERS_COLLECTION")
                .unwrap_or(defaults.owners_collection),
            folders_root,
            list_page_size,
            sweep_concurrency,
            messaging_endpoint: pick(args.messaging_endpoint, "MESSAGING_ENDPOINT")
                .unwrap_or(defaults.messaging_endpoint),
            messaging_api_key: pick(args.messaging_api_key, "MESSAGING_API_KEY"),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_name(suffix: &str) -> String {
    format!("MEDIA_FUNCTIONS_{}", suffix)
}

fn pick(cli: Option<String>, suffix: &str) -> Option<String> {
    cli.or_else(|| env::var(env_name(suffix)).ok())
}

fn pick_parsed<T>(cli: Option<T>, suffix: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if cli.is_some() {
        return Ok(cli);
    }
    let name = env_name(suffix);
    match env::var(&name) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_values_override_everything() {
        let args = Args::try_parse_from([
            "media-functions",
            "--port",
            "8080",
            "--bucket",
            "photos",
            "--folders-root",
            "owners",
            "--list-page-size",
            "50000",
            "--sweep-concurrency",
            "0",
            "--migrate",
        ])
        .unwrap();
        assert!(args.migrate);

        let cfg = AppConfig::merge(args).unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.bucket, "photos");
        assert_eq!(cfg.folders_root, "owners/");
        assert_eq!(cfg.list_page_size, 1000);
        assert_eq!(cfg.sweep_concurrency, 1);
        assert_eq!(cfg.addr(), format!("{}:8080", cfg.host));
    }
}
