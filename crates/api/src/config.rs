use std::path::PathBuf;

use clap::Parser;

/// Default port of the UI server.
pub const DEFAULT_UI_PORT: u16 = 7860;
/// Default port when only the programmatic API is served.
pub const DEFAULT_API_PORT: u16 = 7861;

/// Command line flags. Flags that take a value fall back to an env var.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "webui", version, about = "txt2img web front end")]
pub struct CmdOpts {
    /// Serve only the programmatic API, without the UI endpoints.
    #[arg(long)]
    pub nowebui: bool,

    /// Mount the programmatic API (`/sdapi/v1`) next to the UI.
    #[arg(long)]
    pub api: bool,

    /// Bind to 0.0.0.0 instead of localhost.
    #[arg(long)]
    pub listen: bool,

    /// Explicit bind address; wins over `--listen`.
    #[arg(long, env = "WEBUI_SERVER_NAME")]
    pub server_name: Option<String>,

    #[arg(long, env = "WEBUI_PORT")]
    pub port: Option<u16>,

    #[arg(long)]
    pub tls_keyfile: Option<PathBuf>,

    #[arg(long)]
    pub tls_certfile: Option<PathBuf>,

    /// Accepted for compatibility. HTTPS is terminated by a proxy.
    #[arg(long)]
    pub disable_tls_verify: bool,

    /// Verbose logging and error detail in responses.
    #[arg(long)]
    pub gradio_debug: bool,

    /// Run requests without the bounded generation queue.
    #[arg(long)]
    pub no_gradio_queue: bool,

    /// Open a browser once the server is up.
    #[arg(long)]
    pub autolaunch: bool,

    /// Extra directory the file endpoint may serve. Repeatable.
    #[arg(long = "gradio-allowed-path")]
    pub gradio_allowed_path: Vec<PathBuf>,

    /// URL prefix all routes are mounted under, e.g. `webui`.
    #[arg(long, env = "WEBUI_SUBPATH")]
    pub subpath: Option<String>,

    /// Basic auth credentials, `user:pass[,user:pass...]`.
    #[arg(long, env = "WEBUI_AUTH")]
    pub gradio_auth: Option<String>,

    /// Expose the server stop/restart/kill endpoints on the API.
    #[arg(long)]
    pub api_server_stop: bool,

    /// Comma separated list of allowed CORS origins.
    #[arg(long, env = "WEBUI_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_allow_origins: Vec<String>,

    /// Regex an origin must fully match to be allowed.
    #[arg(long, env = "WEBUI_CORS_ORIGINS_REGEX")]
    pub cors_allow_origins_regex: Option<String>,

    /// Persisted options file.
    #[arg(long, env = "WEBUI_SETTINGS_FILE", default_value = "config.json")]
    pub ui_settings_file: PathBuf,

    /// Base URL of the diffusion worker.
    #[arg(long, env = "WEBUI_ENGINE_URL")]
    pub engine_url: Option<String>,

    /// Public share tunnel. Accepted for compatibility; not supported.
    #[arg(long)]
    pub share: bool,

    /// HTTP request timeout in seconds.
    #[arg(long, env = "WEBUI_REQUEST_TIMEOUT_SECS", default_value_t = 600)]
    pub request_timeout_secs: u64,
}

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid --gradio-auth entry '{0}', expected user:pass")]
    InvalidAuth(String),

    #[error("--tls-keyfile and --tls-certfile must be given together")]
    IncompleteTls,

    #[error("TLS file not found: {0}")]
    TlsFileMissing(PathBuf),

    #[error("HTTPS is not served in process; terminate TLS in a reverse proxy and drop --tls-keyfile/--tls-certfile")]
    TlsNotSupported,

    #[error("Wildcard CORS origin '*' is not allowed; list the origins or use --cors-allow-origins-regex")]
    WildcardCorsOrigin,

    #[error("Invalid --cors-allow-origins-regex: {0}")]
    InvalidCorsRegex(#[from] regex::Error),
}

/// Which surfaces the server mounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMode {
    /// UI endpoints, optionally with the programmatic API.
    Ui,
    /// Programmatic API only (`--nowebui`).
    ApiOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Server configuration resolved from [`CmdOpts`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub mode: ServerMode,
    /// Mount `/sdapi/v1`. Always true in [`ServerMode::ApiOnly`].
    pub api: bool,
    pub api_server_stop: bool,
    pub cors_origins: Vec<String>,
    pub cors_origins_regex: Option<String>,
    pub request_timeout_secs: u64,
    /// Bounded generation queue enabled.
    pub queue_enabled: bool,
    pub autolaunch: bool,
    /// Bound to something other than localhost.
    pub is_non_local: bool,
    pub allowed_paths: Vec<PathBuf>,
    /// Route prefix, `""` or `/something`.
    pub root_path: String,
    pub auth: Vec<Credentials>,
    pub ui_settings_file: PathBuf,
    pub engine_url: Option<String>,
    /// `--share` was given. Only logged; no tunnel is opened.
    pub share: bool,
    pub debug: bool,
}

impl ServerConfig {
    /// Resolve bind address, port, auth and TLS from the command line.
    ///
    /// | Setting | Resolution                                               |
    /// |---------|----------------------------------------------------------|
    /// | host    | `--server-name`, else `0.0.0.0` with `--listen`, else `127.0.0.1` |
    /// | port    | `--port`, else 7861 with `--nowebui`, else 7860          |
    pub fn from_cmd_opts(opts: &CmdOpts) -> Result<Self, ConfigError> {
        let host = match &opts.server_name {
            Some(name) => name.clone(),
            None if opts.listen => "0.0.0.0".to_string(),
            None => "127.0.0.1".to_string(),
        };

        let mode = if opts.nowebui {
            ServerMode::ApiOnly
        } else {
            ServerMode::Ui
        };

        let port = opts.port.unwrap_or(match mode {
            ServerMode::Ui => DEFAULT_UI_PORT,
            ServerMode::ApiOnly => DEFAULT_API_PORT,
        });

        if let Some(pattern) = &opts.cors_allow_origins_regex {
            regex::Regex::new(pattern)?;
        }

        let cors_origins: Vec<String> = opts
            .cors_allow_origins
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if cors_origins.iter().any(|o| o == "*") {
            return Err(ConfigError::WildcardCorsOrigin);
        }

        let auth = match &opts.gradio_auth {
            Some(raw) => parse_credentials(raw)?,
            None => Vec::new(),
        };

        match (&opts.tls_keyfile, &opts.tls_certfile) {
            (None, None) => {}
            (Some(keyfile), Some(certfile)) => {
                for path in [keyfile, certfile] {
                    if !path.is_file() {
                        return Err(ConfigError::TlsFileMissing(path.clone()));
                    }
                }
                return Err(ConfigError::TlsNotSupported);
            }
            _ => return Err(ConfigError::IncompleteTls),
        }

        let root_path = opts
            .subpath
            .as_deref()
            .map(|s| s.trim_matches('/'))
            .filter(|s| !s.is_empty())
            .map(|s| format!("/{s}"))
            .unwrap_or_default();

        Ok(Self {
            is_non_local: opts.listen || opts.share || opts.server_name.is_some(),
            host,
            port,
            mode,
            api: opts.api || mode == ServerMode::ApiOnly,
            api_server_stop: opts.api_server_stop,
            cors_origins,
            cors_origins_regex: opts.cors_allow_origins_regex.clone(),
            request_timeout_secs: opts.request_timeout_secs,
            queue_enabled: !opts.no_gradio_queue,
            autolaunch: opts.autolaunch,
            allowed_paths: opts.gradio_allowed_path.clone(),
            root_path,
            auth,
            ui_settings_file: opts.ui_settings_file.clone(),
            engine_url: opts.engine_url.clone(),
            share: opts.share,
            debug: opts.gradio_debug,
        })
    }
}

/// Parse `user:pass,user2:pass2`. Empty entries are skipped.
fn parse_credentials(raw: &str) -> Result<Vec<Credentials>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (username, password) = entry
                .split_once(':')
                .filter(|(user, _)| !user.is_empty())
                .ok_or_else(|| ConfigError::InvalidAuth(entry.to_string()))?;
            Ok(Credentials {
                username: username.to_string(),
                password: password.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn parse(args: &[&str]) -> ServerConfig {
        let opts = CmdOpts::try_parse_from(std::iter::once("webui").chain(args.iter().copied()))
            .unwrap();
        ServerConfig::from_cmd_opts(&opts).unwrap()
    }

    #[test]
    fn bind_address_resolution() {
        assert_eq!(parse(&[]).host, "127.0.0.1");
        assert_eq!(parse(&["--listen"]).host, "0.0.0.0");
        assert_eq!(
            parse(&["--listen", "--server-name", "10.0.0.5"]).host,
            "10.0.0.5"
        );
    }

    #[test]
    fn port_defaults_depend_on_mode() {
        assert_eq!(parse(&[]).port, DEFAULT_UI_PORT);
        assert_eq!(parse(&["--nowebui"]).port, DEFAULT_API_PORT);
        assert_eq!(parse(&["--nowebui", "--port", "9000"]).port, 9000);
    }

    #[test]
    fn api_only_implies_api() {
        let config = parse(&["--nowebui"]);
        assert_eq!(config.mode, ServerMode::ApiOnly);
        assert!(config.api);
        assert!(!parse(&[]).api);
    }

    #[test]
    fn non_local_flags() {
        assert!(!parse(&[]).is_non_local);
        assert!(parse(&["--listen"]).is_non_local);
        assert!(parse(&["--share"]).is_non_local);
    }

    #[test]
    fn subpath_is_normalized() {
        assert_eq!(parse(&["--subpath", "/webui/"]).root_path, "/webui");
        assert_eq!(parse(&["--subpath", "/"]).root_path, "");
        assert_eq!(parse(&[]).root_path, "");
    }

    #[test]
    fn credentials_are_parsed() {
        let config = parse(&["--gradio-auth", "alice:secret, bob:p:w"]);
        assert_eq!(config.auth.len(), 2);
        assert_eq!(config.auth[1].username, "bob");
        assert_eq!(config.auth[1].password, "p:w");

        assert_matches!(parse_credentials("nocolon"), Err(ConfigError::InvalidAuth(_)));
        assert_matches!(parse_credentials(":pw"), Err(ConfigError::InvalidAuth(_)));
    }

    #[test]
    fn tls_needs_both_files() {
        let opts = CmdOpts {
            tls_keyfile: Some(PathBuf::from("key.pem")),
            ..CmdOpts::default()
        };
        assert_matches!(
            ServerConfig::from_cmd_opts(&opts),
            Err(ConfigError::IncompleteTls)
        );
    }

    #[test]
    fn tls_files_fail_fast_instead_of_serving_plain_http() {
        let dir = tempfile::tempdir().unwrap();
        let key = dir.path().join("key.pem");
        let cert = dir.path().join("cert.pem");
        std::fs::write(&key, b"key").unwrap();
        std::fs::write(&cert, b"cert").unwrap();

        let opts = CmdOpts {
            tls_keyfile: Some(key),
            tls_certfile: Some(cert.clone()),
            ..CmdOpts::default()
        };
        assert_matches!(
            ServerConfig::from_cmd_opts(&opts),
            Err(ConfigError::TlsNotSupported)
        );

        let opts = CmdOpts {
            tls_keyfile: Some(dir.path().join("missing.pem")),
            tls_certfile: Some(cert),
            ..CmdOpts::default()
        };
        assert_matches!(
            ServerConfig::from_cmd_opts(&opts),
            Err(ConfigError::TlsFileMissing(_))
        );
    }

    #[test]
    fn wildcard_cors_origin_is_rejected() {
        let opts = CmdOpts::try_parse_from(["webui", "--cors-allow-origins", "*"]).unwrap();
        assert_matches!(
            ServerConfig::from_cmd_opts(&opts),
            Err(ConfigError::WildcardCorsOrigin)
        );

        let opts =
            CmdOpts::try_parse_from(["webui", "--cors-allow-origins", "http://a.test, *"]).unwrap();
        assert_matches!(
            ServerConfig::from_cmd_opts(&opts),
            Err(ConfigError::WildcardCorsOrigin)
        );
    }

    #[test]
    fn share_flag_is_carried() {
        assert!(parse(&["--share"]).share);
        assert!(!parse(&[]).share);
    }

    #[test]
    fn invalid_cors_regex_is_rejected() {
        let opts = CmdOpts {
            cors_allow_origins_regex: Some("(".to_string()),
            ..CmdOpts::default()
        };
        assert_matches!(
            ServerConfig::from_cmd_opts(&opts),
            Err(ConfigError::InvalidCorsRegex(_))
        );
    }

    #[test]
    fn cors_origins_split_on_commas() {
        let config = parse(&["--cors-allow-origins", "http://a.test, http://b.test"]);
        assert_eq!(config.cors_origins, vec!["http://a.test", "http://b.test"]);
    }
}
