//! oxide-dispatch CLI
//!
//! Loads a route definition file and answers routing questions against it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use regex::RegexBuilder;
use serde::Deserialize;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

use oxide_dispatch::{
    async_handler, normalize_path, status_text, Method, Next, Request, RouteSpec, Server,
    ServerOptions, SharedHandler,
};

/// Inspect how requests are routed.
#[derive(Parser)]
#[command(name = "oxide-dispatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Route definition file (JSON).
    #[arg(short, long, env = "OXIDE_DISPATCH_ROUTES", default_value = "routes.json")]
    routes: PathBuf,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dispatch a synthetic request and print the response.
    Resolve {
        /// HTTP method.
        method: String,

        /// Request target, e.g. `/foo/bar?x=1`.
        url: String,

        /// Value of the `accept-version` header.
        #[arg(long)]
        accept_version: Option<String>,

        /// Value of the `Accept` header.
        #[arg(long)]
        accept: Option<String>,
    },

    /// Print the `Allow` header for a path.
    Allow {
        /// Request target.
        url: String,
    },

    /// List registered routes in insertion order.
    List,
}

#[derive(Debug, Deserialize)]
struct RouteFile {
    #[serde(default)]
    options: ServerOptions,
    routes: Vec<RouteDef>,
}

#[derive(Debug, Deserialize)]
struct RouteDef {
    method: String,
    path: Option<String>,
    regex: Option<String>,
    #[serde(default)]
    case_insensitive: bool,
    version: Option<String>,
    name: Option<String>,
}

impl RouteDef {
    fn spec(&self) -> anyhow::Result<RouteSpec> {
        let mut spec = match (&self.path, &self.regex) {
            (Some(path), None) => RouteSpec::path(path.as_str()),
            (None, Some(regex)) => RouteSpec::regex(
                RegexBuilder::new(regex)
                    .case_insensitive(self.case_insensitive)
                    .build()
                    .with_context(|| format!("invalid regex {regex}"))?,
            ),
            _ => bail!("route needs exactly one of `path` or `regex`"),
        };
        if let Some(version) = &self.version {
            spec = spec.version(version.as_str());
        }
        if let Some(name) = &self.name {
            spec = spec.name(name.as_str());
        }
        Ok(spec)
    }
}

fn load(path: &Path) -> anyhow::Result<Server> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let file: RouteFile = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    let server = Server::with_options(file.options);
    for def in &file.routes {
        let method: Method = def.method.parse().map_err(anyhow::Error::msg)?;
        let echo = async_handler(|req, res| {
            Box::pin(async move {
                let route = req.route.as_ref().map(|route| {
                    serde_json::json!({
                        "id": route.id().to_string(),
                        "name": route.name(),
                        "method": route.method(),
                        "pattern": route.pattern().as_str(),
                        "version": route.version().map(ToString::to_string),
                    })
                });
                let params: serde_json::Map<String, serde_json::Value> = req
                    .params
                    .iter()
                    .map(|(k, v)| (k.to_string(), serde_json::Value::from(v)))
                    .collect();
                res.send(serde_json::json!({ "route": route, "params": params }));
                Next::Continue
            })
        });
        let handler: SharedHandler = Arc::new(echo);
        let id = server.on(method, def.spec()?, vec![handler])?;
        debug!(%id, "loaded route");
    }
    info!(routes = server.routes().len(), "route table loaded");
    Ok(server)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let server = load(&cli.routes)?;

    match cli.command {
        Commands::Resolve {
            method,
            url,
            accept_version,
            accept,
        } => {
            let method: Method = method.parse().map_err(anyhow::Error::msg)?;
            let mut req = Request::new(method, url);
            if let Some(range) = accept_version {
                req = req.header("accept-version", range);
            }
            if let Some(accept) = accept {
                req = req.header("Accept", accept);
            }

            let res = server.handle(req).await;
            println!("{} {}", res.status, status_text(res.status));
            for (name, value) in res.headers.iter() {
                println!("{name}: {value}");
            }
            println!();
            println!("{}", String::from_utf8_lossy(&res.body));
        }
        Commands::Allow { url } => {
            let path = normalize_path(&url)?;
            println!("{}", server.routes().allow_header(&path));
        }
        Commands::List => {
            for route in server.routes().snapshot().iter() {
                match route.name() {
                    Some(name) => println!("{}  {route}  [{name}]", route.id()),
                    None => println!("{}  {route}", route.id()),
                }
            }
        }
    }

    Ok(())
}
