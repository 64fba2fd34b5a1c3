pub mod console;
pub mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use imagesearch_core::AuthManager;
use imagesearch_core::CallExecutor;
use imagesearch_core::ClientConfig;
use imagesearch_core::CredentialProvider;
use imagesearch_core::HttpCredentialProvider;
use imagesearch_core::HttpImageSearchClient;
use imagesearch_core::ImageService;
use imagesearch_core::UserPrompt;
use imagesearch_core::auth::read_refresh_token_from_env;
use imagesearch_core::config::default_config_path;
use imagesearch_protocol::SearchImagesRequest;
use imagesearch_protocol::search::FIRST_PAGE;
use imagesearch_search_panel::ClickEvent;
use imagesearch_search_panel::FormChange;
use imagesearch_search_panel::RenderedOutput;
use imagesearch_search_panel::SearchPipeline;
use tracing::debug;

use crate::console::ConsoleBoundary;
use crate::console::ConsoleNotifier;

/// Search the image backend from the terminal.
#[derive(Debug, Parser)]
#[command(name = "imagesearch", version)]
pub struct Cli {
    /// Config file to load instead of `$IMAGESEARCH_HOME/config.toml`.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override the backend base URL from the config file.
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Run a single search and print the results.
    Search(SearchArgs),

    /// Interactive type-ahead search session on stdin.
    Browse,

    /// Show whether credentials are configured.
    Token,
}

#[derive(Debug, clap::Args)]
pub struct SearchArgs {
    /// Text to search for.
    pub query: String,

    /// Page to request, starting at 1.
    #[arg(long, default_value_t = FIRST_PAGE)]
    pub page: u32,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config = self.load_config()?;
        match self.command {
            Command::Search(args) => run_search(&config, args).await,
            Command::Browse => run_browse(&config).await,
            Command::Token => {
                run_token(&config);
                Ok(())
            }
        }
    }

    fn load_config(&self) -> Result<ClientConfig> {
        let path = match &self.config {
            Some(path) => path.clone(),
            None => default_config_path()?,
        };
        debug!("loading config from {}", path.display());
        let mut config = ClientConfig::load(&path)?;
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
            config.validate().context("invalid --base-url override")?;
        }
        Ok(config)
    }
}

fn build_auth(config: &ClientConfig) -> Arc<AuthManager> {
    let provider = match (&config.token_endpoint, read_refresh_token_from_env()) {
        (Some(endpoint), Some(refresh_token)) => {
            let provider: Arc<dyn CredentialProvider> = Arc::new(HttpCredentialProvider::new(
                endpoint.clone(),
                refresh_token,
            ));
            Some(provider)
        }
        _ => None,
    };
    AuthManager::from_env(provider)
}

fn build_service(config: &ClientConfig, prompt: Arc<dyn UserPrompt>) -> ImageService {
    let executor = CallExecutor::new(build_auth(config), prompt, Arc::new(ConsoleNotifier))
        .with_retry_limit(config.retry_limit)
        .with_call_timeout(config.call_timeout());
    let transport = Arc::new(HttpImageSearchClient::new(config.base_url.clone()));
    ImageService::new(executor, transport)
}

async fn run_search(config: &ClientConfig, args: SearchArgs) -> Result<()> {
    let (prompt, _lines) = console::spawn_stdin_router();
    let service = build_service(config, Arc::new(prompt));
    let request = SearchImagesRequest::new(args.query, args.page);
    let page = request.page;
    let response = service.search_images(request).await?;
    console::print_output(&RenderedOutput::from_response(&response, page));
    Ok(())
}

async fn run_browse(config: &ClientConfig) -> Result<()> {
    let (prompt, mut lines) = console::spawn_stdin_router();
    let service = build_service(config, Arc::new(prompt));
    let pipeline =
        SearchPipeline::spawn(config.search.clone(), service, Arc::new(ConsoleBoundary));
    let handle = pipeline.handle();
    let mut page = FIRST_PAGE;

    println!("{BROWSE_HELP}");
    while let Some(line) = lines.recv().await {
        let accepted = match parse_browse_line(&line) {
            Ok(BrowseCommand::Query(query)) => handle.change(FormChange::Query(query)),
            Ok(BrowseCommand::Page(next)) => {
                page = next.max(FIRST_PAGE);
                handle.change(FormChange::Page(page))
            }
            Ok(BrowseCommand::Next) => {
                page = page.saturating_add(1);
                handle.click(ClickEvent::NextPage(page))
            }
            Ok(BrowseCommand::Open(id)) => handle.click(ClickEvent::Image(id)),
            Ok(BrowseCommand::Quit) => break,
            Err(message) => {
                eprintln!("{message}");
                true
            }
        };
        if !accepted {
            break;
        }
    }
    pipeline.shutdown().await;
    Ok(())
}

fn run_token(config: &ClientConfig) {
    let auth = build_auth(config);
    let access = if auth.current_token().is_some() {
        "configured"
    } else {
        "not configured"
    };
    println!("access token: {access}");
    match (&config.token_endpoint, read_refresh_token_from_env()) {
        (Some(endpoint), Some(_)) => println!("refresh: enabled via {endpoint}"),
        (None, Some(_)) => println!("refresh: disabled (no token_endpoint configured)"),
        (_, None) => println!("refresh: disabled"),
    }
}

const BROWSE_HELP: &str =
    "commands: q <text> | p <page> | next | open <id> | quit (answer retry prompts with r or c)";

#[derive(Debug, PartialEq, Eq)]
pub enum BrowseCommand {
    Query(String),
    Page(u32),
    Next,
    Open(String),
    Quit,
}

pub fn parse_browse_line(line: &str) -> Result<BrowseCommand, String> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (word, rest) = match line.split_once(' ') {
        Some((word, rest)) => (word, rest),
        None => (line, ""),
    };
    match word {
        "q" | "query" => Ok(BrowseCommand::Query(rest.to_string())),
        "p" | "page" => rest
            .trim()
            .parse()
            .map(BrowseCommand::Page)
            .map_err(|_| format!("not a page number: {rest:?}")),
        "next" => Ok(BrowseCommand::Next),
        "open" if !rest.trim().is_empty() => Ok(BrowseCommand::Open(rest.trim().to_string())),
        "open" => Err("usage: open <id>".to_string()),
        "quit" | "exit" => Ok(BrowseCommand::Quit),
        other => Err(format!("unknown command {other:?}; {BROWSE_HELP}")),
    }
}
