use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tweetstream::logging::{self, LoggingMode};
use tweetstream::{
    BasicCredentials, BoundingBox, Callback, Credentials, LimitNotice, OAuthCredentials,
    ProxyConfig, ReconnectNotice, SessionHandle, StaticAuthorization, Status, StreamClient,
    StreamConfig, StreamError, StreamItem, StreamParams,
};

mod settings;

use settings::FileSettings;

/// Streaming API command line client
///
/// Opens one stream, prints every status it delivers, and reconnects on
/// failure until the reconnect budget is spent.
#[derive(Parser, Debug)]
#[command(name = "tweetstream")]
#[command(about = "Run one stream and print what it delivers")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: StreamCommand,

    /// User-Agent header value
    #[arg(long, global = true)]
    pub user_agent: Option<String>,

    /// HTTP proxy URI
    #[arg(long, global = true)]
    pub proxy: Option<String>,

    /// Use HTTP Basic auth with this username
    #[arg(long, global = true)]
    pub basic_username: Option<String>,

    /// Password for --basic-username
    #[arg(long, global = true)]
    pub basic_password: Option<String>,

    /// Pre-built OAuth Authorization header
    #[arg(long, global = true)]
    pub authorization: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Stop after this many statuses. Site-stream envelopes count only when
    /// they wrap a status.
    #[arg(long, global = true)]
    pub limit: Option<u64>,

    /// Print every raw message instead of formatted statuses
    #[arg(long, global = true)]
    pub raw: bool,

    /// Settings file (default: <config dir>/tweetstream/config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum StreamCommand {
    /// Statuses containing any of the keywords
    Track {
        #[arg(required = true)]
        keywords: Vec<String>,
    },
    /// Statuses from the given user ids
    Follow {
        #[arg(required = true)]
        user_ids: Vec<String>,
    },
    /// Statuses inside bounding boxes given as sw_lng,sw_lat,ne_lng,ne_lat
    Locations {
        #[arg(required = true)]
        boxes: Vec<String>,
    },
    /// A random sample of all statuses
    Sample,
    /// The authenticated user's stream
    Userstream {
        /// `user` or `followings`
        #[arg(long)]
        with: Option<String>,
        /// Set to `all` for all replies
        #[arg(long)]
        replies: Option<String>,
    },
    /// A site stream for the given user ids
    Sitestream {
        #[arg(required = true)]
        user_ids: Vec<String>,
        /// Include the followings of each user
        #[arg(long)]
        followings: bool,
    },
}

impl Args {
    /// Validate command line arguments
    pub fn validate(&self) -> Result<()> {
        if let Some(level) = &self.log_level {
            validate_log_level(level)?;
        }

        if self.limit == Some(0) {
            return Err(anyhow!("--limit must be at least 1"));
        }

        if self.basic_password.is_some() && self.basic_username.is_none() {
            return Err(anyhow!("--basic-password requires --basic-username"));
        }

        if self.basic_username.is_some() && self.authorization.is_some() {
            return Err(anyhow!(
                "--basic-username and --authorization are mutually exclusive"
            ));
        }

        if let StreamCommand::Locations { boxes } = &self.command {
            for spec in boxes {
                parse_bounding_box(spec)?;
            }
        }

        Ok(())
    }
}

fn validate_log_level(level: &str) -> Result<()> {
    match level.to_lowercase().as_str() {
        "error" | "warn" | "info" | "debug" | "trace" => Ok(()),
        _ => Err(anyhow!(
            "Invalid log level '{}'. Valid levels: error, warn, info, debug, trace",
            level
        )),
    }
}

/// Parse `sw_lng,sw_lat,ne_lng,ne_lat`
fn parse_bounding_box(spec: &str) -> Result<BoundingBox> {
    let coords = spec
        .split(',')
        .map(|c| c.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("Invalid bounding box '{}'", spec))?;

    match coords.as_slice() {
        [sw_lng, sw_lat, ne_lng, ne_lat] => Ok(BoundingBox::new(*sw_lng, *sw_lat, *ne_lng, *ne_lat)),
        _ => Err(anyhow!(
            "Invalid bounding box '{}': expected sw_lng,sw_lat,ne_lng,ne_lat",
            spec
        )),
    }
}

/// Variable names the settings file stands in for
fn settings_var(settings: &FileSettings, key: &str) -> Option<String> {
    match key {
        "TWEETSTREAM_AUTH_METHOD" if settings.username.is_some() && settings.consumer_key.is_none() => {
            Some("basic".to_string())
        }
        "TWEETSTREAM_USERNAME" => settings.username.clone(),
        "TWEETSTREAM_PASSWORD" => settings.password.clone(),
        "TWEETSTREAM_CONSUMER_KEY" => settings.consumer_key.clone(),
        "TWEETSTREAM_CONSUMER_SECRET" => settings.consumer_secret.clone(),
        "TWEETSTREAM_OAUTH_TOKEN" => settings.oauth_token.clone(),
        "TWEETSTREAM_OAUTH_TOKEN_SECRET" => settings.oauth_token_secret.clone(),
        "TWEETSTREAM_AUTHORIZATION" => settings.authorization.clone(),
        "TWEETSTREAM_USER_AGENT" => settings.user_agent.clone(),
        "TWEETSTREAM_PROXY" => settings.proxy.clone(),
        _ => None,
    }
}

/// Merge settings: flags over environment over settings file over defaults
fn build_config(
    args: &Args,
    settings: &FileSettings,
    env: impl Fn(&str) -> Option<String>,
) -> Result<StreamConfig> {
    let mut config = StreamConfig::from_lookup(|key| env(key).or_else(|| settings_var(settings, key)))
        .context("Invalid stream settings")?;

    if let Some(username) = &args.basic_username {
        let password = args.basic_password.clone().unwrap_or_default();
        config = config
            .with_credentials(Some(Credentials::Basic(BasicCredentials::new(username.clone(), password))))
            .with_signer(None);
    }

    if let Some(header) = &args.authorization {
        let credentials = match config.credentials.take() {
            Some(Credentials::OAuth(oauth)) => oauth,
            _ => OAuthCredentials::default(),
        };
        config = config
            .with_credentials(Some(Credentials::OAuth(credentials)))
            .with_signer(Some(Arc::new(StaticAuthorization::new(header.clone()))));
    }

    if let Some(user_agent) = &args.user_agent {
        config = config.with_user_agent(user_agent.clone());
    }
    if let Some(proxy) = &args.proxy {
        config = config.with_proxy(Some(ProxyConfig::new(proxy.clone())));
    }

    config.validate().context("Invalid stream settings")?;
    Ok(config)
}

fn format_status(status: &Status) -> String {
    let author = status.user.screen_name.as_deref().unwrap_or("?");
    format!("@{}: {}", author, status.text)
}

fn format_item(item: &StreamItem) -> String {
    match item {
        StreamItem::Status(status) => format_status(status),
        StreamItem::ForUser(message) => match message.status() {
            Some(status) => format!("[{}] {}", message.for_user, format_status(&status)),
            None => format!("[{}] {}", message.for_user, message.message),
        },
    }
}

fn register_handlers(client: &mut StreamClient, raw: bool) {
    client
        .on_error(Callback::new(|message: String| warn!("{}", message)))
        .on_unauthorized(Callback::new(|()| {
            warn!("Unauthorized; check credentials and the system clock")
        }))
        .on_enhance_your_calm(Callback::new(|()| warn!("Rate limited by the server")))
        .on_limit(Callback::new(|notice: LimitNotice| {
            info!(undelivered = notice.track, "Track limit reached")
        }))
        .on_reconnect(Callback::new(|notice: ReconnectNotice| {
            info!(
                retries = notice.retries,
                timeout_ms = notice.timeout.as_millis() as u64,
                "Reconnecting"
            )
        }))
        .on_no_data_received(Callback::new(|()| warn!("No data received")));

    if raw {
        client.on_anything(Callback::new(|value: serde_json::Value| println!("{}", value)));
    }
}

/// Whether `item` counts toward `--limit`
fn is_status(item: &StreamItem) -> bool {
    match item {
        StreamItem::Status(_) => true,
        StreamItem::ForUser(message) => message.status().is_some(),
    }
}

/// The block printing statuses and enforcing `--limit`
fn status_block(raw: bool, limit: Option<u64>) -> Callback<StreamItem> {
    let seen = AtomicU64::new(0);
    Callback::with_session(move |item: StreamItem, session: &SessionHandle| {
        if !raw {
            println!("{}", format_item(&item));
        }
        if !is_status(&item) {
            return;
        }
        let count = seen.fetch_add(1, Ordering::SeqCst) + 1;
        if limit.is_some_and(|limit| count >= limit) {
            info!(count, "Status limit reached");
            session.stop_stream();
        }
    })
}

async fn run_stream(
    client: &StreamClient,
    command: StreamCommand,
    block: Callback<StreamItem>,
) -> tweetstream::Result<Option<Status>> {
    let block = Some(block);
    match command {
        StreamCommand::Track { keywords } => client.track(keywords, block).await,
        StreamCommand::Follow { user_ids } => client.follow(user_ids, block).await,
        StreamCommand::Locations { boxes } => {
            let boxes = boxes
                .iter()
                .filter_map(|spec| parse_bounding_box(spec).ok())
                .collect::<Vec<_>>();
            client.locations(boxes, block).await
        }
        StreamCommand::Sample => client.sample(StreamParams::new(), block).await,
        StreamCommand::Userstream { with, replies } => {
            let mut params = StreamParams::new();
            if let Some(with) = with {
                params.set("with", with);
            }
            if let Some(replies) = replies {
                params.set("replies", replies);
            }
            client.userstream(params, block).await
        }
        StreamCommand::Sitestream { user_ids, followings } => {
            let mut params = StreamParams::new();
            if followings {
                params.set("followings", true);
            }
            client.sitestream(user_ids, params, block).await
        }
    }
}

/// Streams run on this binary's tokio runtime through the async client
/// methods. The blocking `StreamClient::start` is not used here: it refuses
/// to run inside an existing runtime rather than joining it.
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    args.validate()?;

    let settings = FileSettings::load(args.config.as_deref())?;
    let level = args
        .log_level
        .clone()
        .or_else(|| settings.log_level.clone())
        .unwrap_or_else(|| "info".to_string());
    validate_log_level(&level)?;
    logging::init_logging_with_level(LoggingMode::Development, Some(&level))
        .context("Failed to initialize logging")?;

    let config = build_config(&args, &settings, |key| std::env::var(key).ok())?;
    let mut client = StreamClient::new(config);
    register_handlers(&mut client, args.raw);

    let reactor = client.reactor().clone();
    ctrlc::set_handler(move || reactor.stop()).context("Failed to install Ctrl-C handler")?;

    let block = status_block(args.raw, args.limit);
    match run_stream(&client, args.command, block).await {
        Ok(last) => {
            if let Some(status) = last {
                info!(id = status.id, "Last status: {}", format_status(&status));
            }
            Ok(())
        }
        Err(StreamError::Reconnect(e)) => {
            error!(retries = e.retries, "{}", e);
            std::process::exit(2);
        }
        Err(e) => Err(e).context("Stream failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(args).unwrap()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_parse_track_with_global_flags() {
        let args = parse(&["tweetstream", "track", "rust", "tokio", "--limit", "5", "--raw"]);
        assert_eq!(
            args.command,
            StreamCommand::Track {
                keywords: vec!["rust".to_string(), "tokio".to_string()]
            }
        );
        assert_eq!(args.limit, Some(5));
        assert!(args.raw);
        assert!(args.validate().is_ok());
    }

    #[rstest]
    #[case(&["tweetstream", "sample", "--limit", "0"])]
    #[case(&["tweetstream", "sample", "--basic-password", "x"])]
    #[case(&["tweetstream", "sample", "--log-level", "loud"])]
    #[case(&["tweetstream", "locations", "1,2,3"])]
    #[case(&["tweetstream", "sample", "--basic-username", "a", "--authorization", "OAuth x"])]
    fn test_invalid_arguments(#[case] argv: &[&str]) {
        assert!(parse(argv).validate().is_err());
    }

    #[test]
    fn test_parse_bounding_box() {
        let parsed = parse_bounding_box("-122.75, 36.8,-121.75,37.8").unwrap();
        assert_eq!(parsed, BoundingBox::new(-122.75, 36.8, -121.75, 37.8));
        assert!(parse_bounding_box("a,b,c,d").is_err());
    }

    #[test]
    fn test_flags_override_settings_file() {
        let args = parse(&[
            "tweetstream",
            "sample",
            "--basic-username",
            "flag-user",
            "--basic-password",
            "pw",
            "--user-agent",
            "cli/1.0",
        ]);
        let settings = FileSettings {
            username: Some("file-user".to_string()),
            user_agent: Some("file/1.0".to_string()),
            proxy: Some("http://proxy.local:3128".to_string()),
            ..Default::default()
        };

        let config = build_config(&args, &settings, no_env).unwrap();
        assert_eq!(
            config.credentials,
            Some(Credentials::Basic(BasicCredentials::new("flag-user", "pw")))
        );
        assert_eq!(config.user_agent, "cli/1.0");
        assert_eq!(config.proxy, Some(ProxyConfig::new("http://proxy.local:3128")));
    }

    #[test]
    fn test_environment_overrides_settings_file() {
        let args = parse(&["tweetstream", "sample"]);
        let settings = FileSettings {
            user_agent: Some("file/1.0".to_string()),
            ..Default::default()
        };

        let config = build_config(&args, &settings, |key| {
            (key == "TWEETSTREAM_USER_AGENT").then(|| "env/1.0".to_string())
        })
        .unwrap();
        assert_eq!(config.user_agent, "env/1.0");
    }

    #[test]
    fn test_authorization_flag_installs_signer() {
        let args = parse(&["tweetstream", "sample", "--authorization", "OAuth oauth_token=\"t\""]);
        let config = build_config(&args, &FileSettings::default(), no_env).unwrap();

        assert!(matches!(config.credentials, Some(Credentials::OAuth(_))));
        assert!(config.signer.is_some());
    }

    #[test]
    fn test_format_item() {
        let status: Status =
            serde_json::from_str(r#"{"text":"hello","user":{"screen_name":"bob"}}"#).unwrap();
        assert_eq!(format_item(&StreamItem::Status(status)), "@bob: hello");
    }

    #[test]
    fn test_limit_counts_only_statuses() {
        let status: Status = serde_json::from_str(r#"{"text":"hello","user":{}}"#).unwrap();
        assert!(is_status(&StreamItem::Status(status)));

        let wrapped = tweetstream::ForUserMessage::from_value(&serde_json::json!({
            "for_user": 1,
            "message": {"text": "hello", "user": {}}
        }))
        .unwrap();
        assert!(is_status(&StreamItem::ForUser(wrapped)));

        let friends = tweetstream::ForUserMessage::from_value(&serde_json::json!({
            "for_user": 1,
            "message": {"friends": [2, 3]}
        }))
        .unwrap();
        assert!(!is_status(&StreamItem::ForUser(friends)));
    }
}
