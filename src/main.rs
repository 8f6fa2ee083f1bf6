//! atl11 - fetch ICESat-2/ATL11 granules and merge their pair tracks.

use anyhow::{bail, Context, Result};
use atl11_prep::config::{Config, TrackSelection, REFERENCE_POINT_DIM};
use atl11_prep::credentials::{
    parse_expiration, CredentialProvider, EarthdataAuth, EarthdataCredentials, S3Credentials,
    StaticCredentials,
};
use atl11_prep::data::{GroupSource, PhonyDims};
use atl11_prep::discovery::{BoundingBox, CmrClient, DateRange};
use atl11_prep::merge::merge_selection;
use atl11_prep::remote::{ObjectUrl, RemoteFileOpener, RemoteObject};
use atl11_prep::writer::{write_dataset, write_tree};
use chrono::{NaiveDate, Utc};
use clap::{ArgAction, Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "atl11", version)]
#[command(about = "Fetch ICESat-2/ATL11 granules and merge their pair tracks", long_about = None)]
struct Args {
    /// Enable logging to specified file
    #[arg(long, global = true)]
    log: Option<PathBuf>,

    /// JSON configuration file overriding the built-in defaults
    #[arg(long, global = true, env = "ATL11_CONFIG")]
    config: Option<PathBuf>,

    /// Log more to stderr (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search CMR for granules and print their S3 URLs
    Search(SearchArgs),
    /// Obtain temporary S3 credentials through Earthdata Login
    Credentials {
        #[command(flatten)]
        earthdata: EarthdataArgs,

        /// Print shell `export` lines, secrets included
        #[arg(long)]
        export: bool,
    },
    /// Show the root dataset and the groups below it
    Inspect {
        /// s3://bucket/key, file:///path or a local path
        url: String,

        #[command(flatten)]
        access: AccessArgs,
    },
    /// Merge groups of a granule into one tree
    Merge(MergeArgs),
}

#[derive(ClapArgs, Debug)]
struct SearchArgs {
    /// Product short name
    #[arg(long, default_value = "ATL11")]
    short_name: String,

    /// Product version
    #[arg(long = "product-version")]
    product_version: Option<String>,

    /// Bounding box as W,S,E,N (default: Antarctica)
    #[arg(long, allow_hyphen_values = true)]
    bbox: Option<BoundingBox>,

    /// First day, YYYY-MM-DD
    #[arg(long)]
    start: Option<NaiveDate>,

    /// Last day, YYYY-MM-DD
    #[arg(long)]
    end: Option<NaiveDate>,

    /// CMR provider, e.g. NSIDC_CPRD
    #[arg(long)]
    provider: Option<String>,

    /// Stop after this many granules
    #[arg(long)]
    limit: Option<usize>,

    /// Print JSON instead of one line per granule
    #[arg(long)]
    json: bool,
}

#[derive(ClapArgs, Debug)]
struct EarthdataArgs {
    /// Earthdata Login user token
    #[arg(long, env = "EARTHDATA_TOKEN", hide_env_values = true)]
    earthdata_token: Option<String>,

    /// Earthdata Login username
    #[arg(long, env = "EARTHDATA_USERNAME")]
    earthdata_username: Option<String>,

    /// Earthdata Login password
    #[arg(long, env = "EARTHDATA_PASSWORD", hide_env_values = true)]
    earthdata_password: Option<String>,

    /// DAAC endpoint issuing temporary S3 credentials
    #[arg(long)]
    s3_credentials_url: Option<String>,
}

impl EarthdataArgs {
    fn auth(&self) -> Option<EarthdataAuth> {
        if let Some(token) = &self.earthdata_token {
            return Some(EarthdataAuth::Token(token.clone()));
        }
        match (&self.earthdata_username, &self.earthdata_password) {
            (Some(username), Some(password)) => Some(EarthdataAuth::Login {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }

    fn provider(&self, config: &Config) -> Option<EarthdataCredentials> {
        let url = self
            .s3_credentials_url
            .clone()
            .unwrap_or_else(|| config.s3_credentials_url.clone());
        self.auth()
            .map(|auth| EarthdataCredentials::new(auth, config.earthdata_token_url.clone(), url))
    }
}

#[derive(ClapArgs, Debug)]
struct AccessArgs {
    /// S3 access key id
    #[arg(long, env = "AWS_ACCESS_KEY_ID")]
    access_key_id: Option<String>,

    /// S3 secret access key
    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    secret_access_key: Option<String>,

    /// S3 session token
    #[arg(long, env = "AWS_SESSION_TOKEN", hide_env_values = true)]
    session_token: Option<String>,

    /// When the S3 credentials expire (RFC 3339 or `YYYY-MM-DD HH:MM:SS+00:00`)
    #[arg(long)]
    expires_at: Option<String>,

    /// Bucket region
    #[arg(long, env = "AWS_REGION")]
    region: Option<String>,

    /// Endpoint of an S3-compatible store
    #[arg(long, env = "AWS_ENDPOINT_URL")]
    endpoint: Option<String>,

    /// Allow plain HTTP to the endpoint
    #[arg(long)]
    allow_http: bool,

    /// Fail on variables mixing labeled and unlabeled dimensions
    #[arg(long)]
    reject_phony_dims: bool,

    #[command(flatten)]
    earthdata: EarthdataArgs,
}

impl AccessArgs {
    fn opener(&self, config: &Config) -> RemoteFileOpener {
        let mut opener = config.opener.clone();
        if let Some(region) = &self.region {
            opener.region = region.clone();
        }
        if self.endpoint.is_some() {
            opener.endpoint = self.endpoint.clone();
        }
        opener.allow_http |= self.allow_http;
        RemoteFileOpener::new(opener)
    }

    /// Credentials for S3 URLs: explicit keys first, then Earthdata Login.
    async fn credentials(&self, config: &Config) -> Result<Option<S3Credentials>> {
        if let (Some(key), Some(secret)) = (&self.access_key_id, &self.secret_access_key) {
            let expires_at = self
                .expires_at
                .as_deref()
                .map(parse_expiration)
                .transpose()?;
            let provider =
                StaticCredentials::new(key, secret, self.session_token.clone(), expires_at);
            return Ok(Some(provider.credentials().await?));
        }
        match self.earthdata.provider(config) {
            Some(provider) => Ok(Some(provider.credentials().await?)),
            None => Ok(None),
        }
    }

    async fn open(&self, config: &Config, raw_url: &str) -> Result<RemoteObject> {
        let url = ObjectUrl::parse(raw_url)?;
        let credentials = match url {
            ObjectUrl::S3 { .. } => self.credentials(config).await?,
            ObjectUrl::Local(_) => None,
        };
        let object = self
            .opener(config)
            .open(&url, credentials.as_ref())
            .await
            .with_context(|| format!("Failed to open {}", url))?;

        let phony_dims = if self.reject_phony_dims {
            PhonyDims::Reject
        } else {
            PhonyDims::Access
        };
        Ok(object.with_phony_dims(phony_dims))
    }
}

#[derive(ClapArgs, Debug)]
struct MergeArgs {
    /// s3://bucket/key, file:///path or a local path
    url: String,

    /// Groups to merge, in order (default: pt1,pt2,pt3)
    #[arg(long, value_delimiter = ',', conflicts_with = "discover")]
    tracks: Option<Vec<String>>,

    /// Merge every `pt<N>` group found in the granule
    #[arg(long)]
    discover: bool,

    /// Also concatenate all tracks along the reference point dimension
    #[arg(long)]
    flatten: bool,

    /// Dimension to flatten along
    #[arg(long, default_value = REFERENCE_POINT_DIM)]
    dim: String,

    /// Write the result to a netCDF-4 file
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    access: AccessArgs,
}

fn init_logging(args: &Args) -> Result<()> {
    // Set up logging to a file if --log option is provided
    if let Some(log_path) = &args.log {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(log_path)
            .with_context(|| format!("Failed to open log file {}", log_path.display()))?;
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("debug"))
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .try_init()
            .map_err(|e| anyhow::anyhow!(e))?;
        tracing::info!("Starting atl11");
        return Ok(());
    }

    let level = match args.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    let config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::default(),
    };

    match args.command {
        Command::Search(search) => run_search(&config, search).await,
        Command::Credentials { earthdata, export } => {
            run_credentials(&config, &earthdata, export).await
        }
        Command::Inspect { url, access } => run_inspect(&config, &url, &access).await,
        Command::Merge(merge) => run_merge(&config, merge).await,
    }
}

async fn run_search(config: &Config, args: SearchArgs) -> Result<()> {
    let mut query = config.query.clone();
    query.short_name = args.short_name;
    query.version = args.product_version;
    query.provider = args.provider;
    query.limit = args.limit;
    if let Some(bbox) = args.bbox {
        query.bounding_box = bbox;
    }
    if args.start.is_some() || args.end.is_some() {
        query.temporal = DateRange::new(
            args.start.unwrap_or(query.temporal.start),
            args.end.unwrap_or(query.temporal.end),
        )?;
    }

    let granules = CmrClient::new(config.cmr_url.clone())
        .search(&query)
        .await
        .context("Granule search failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&granules)?);
    } else {
        for granule in &granules {
            let url = granule
                .s3_urls
                .first()
                .or_else(|| granule.https_urls.first())
                .map(String::as_str)
                .unwrap_or("-");
            println!("{}\t{}", granule.id, url);
        }
        eprintln!("{} granules", granules.len());
    }
    Ok(())
}

async fn run_credentials(config: &Config, args: &EarthdataArgs, export: bool) -> Result<()> {
    let Some(provider) = args.provider(config) else {
        bail!("Earthdata Login needed: set EARTHDATA_TOKEN or EARTHDATA_USERNAME and EARTHDATA_PASSWORD");
    };
    let credentials = provider.credentials().await?;

    if export {
        println!("export AWS_ACCESS_KEY_ID={}", credentials.access_key_id);
        println!("export AWS_SECRET_ACCESS_KEY={}", credentials.secret_access_key);
        if let Some(token) = &credentials.session_token {
            println!("export AWS_SESSION_TOKEN={}", token);
        }
        println!("# expires at {}", credentials.expires_at.to_rfc3339());
    } else {
        let minutes = credentials.remaining_at(Utc::now()).num_minutes();
        println!(
            "S3 credentials for {} valid until {} ({} min)",
            credentials.access_key_id, credentials.expires_at, minutes
        );
    }
    Ok(())
}

async fn run_inspect(config: &Config, url: &str, access: &AccessArgs) -> Result<()> {
    let object = access.open(config, url).await?;
    let root = object.open_group(None)?;
    println!("{}", root);
    Ok(())
}

async fn run_merge(config: &Config, args: MergeArgs) -> Result<()> {
    let selection = if args.discover {
        TrackSelection::discover_pair_tracks()
    } else {
        TrackSelection::Fixed(args.tracks.unwrap_or_else(|| config.pair_tracks.clone()))
    };
    if matches!(&selection, TrackSelection::Fixed(names) if names.is_empty()) {
        bail!("No groups to merge");
    }

    let object = args.access.open(config, &args.url).await?;
    let tree = merge_selection(&object, &selection)
        .with_context(|| format!("Failed to merge groups of {}", object.url()))?;
    println!("{}", tree);

    if args.flatten {
        let flat = tree.flatten(&args.dim)?;
        println!("{}", flat);
        if let Some(path) = &args.output {
            write_dataset(&flat, path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
    } else if let Some(path) = &args.output {
        write_tree(&tree, path).with_context(|| format!("Failed to write {}", path.display()))?;
    }

    Ok(())
}
