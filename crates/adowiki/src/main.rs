use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use adowiki_core::{
    ClientSettings, DEFAULT_SEARCH_LIMIT, WikiClient, crawl, load_config, search,
};

const DEFAULT_CONFIG_FILENAME: &str = "adowiki.toml";

#[derive(Debug, Parser)]
#[command(
    name = "adowiki",
    version,
    about = "Interact with Azure DevOps wikis via the REST API"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH", help = "Config file path")]
    config: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Write the JSON result to this file instead of printing"
    )]
    output: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "List all wikis in the configured project")]
    ListWikis,
    #[command(about = "List all pages in a wiki (full recursion)")]
    ListPages(WikiArgs),
    #[command(about = "Fetch the content of a page by path or id")]
    GetPage(GetPageArgs),
    #[command(about = "Fetch the content of every page in a wiki")]
    Crawl(WikiArgs),
    #[command(about = "Substring search over all pages of a wiki")]
    Search(SearchArgs),
    #[command(
        name = "search-remote",
        about = "Delegate the search to the Azure DevOps search service"
    )]
    SearchRemote(SearchArgs),
    #[command(about = "Create a page or overwrite an existing one")]
    PutPage(PutPageArgs),
    #[command(about = "Delete a page by path")]
    DeletePage(DeletePageArgs),
    #[command(about = "Wiki attachment operations")]
    Attachments(AttachmentsArgs),
}

#[derive(Debug, Args)]
struct WikiArgs {
    #[arg(long, value_name = "NAME", help = "Wiki identifier (name or id)")]
    wiki: String,
}

#[derive(Debug, Args)]
struct GetPageArgs {
    #[arg(long, value_name = "NAME")]
    wiki: String,
    #[arg(long, value_name = "PATH", help = "Page path, e.g. /Home/GettingStarted")]
    path: Option<String>,
    #[arg(long, value_name = "ID", conflicts_with = "path")]
    page_id: Option<i64>,
}

#[derive(Debug, Args)]
struct SearchArgs {
    #[arg(long, value_name = "NAME")]
    wiki: String,
    #[arg(long, value_name = "TEXT", help = "Keyword to search for")]
    query: String,
    #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
    limit: usize,
}

#[derive(Debug, Args)]
struct PutPageArgs {
    #[arg(long, value_name = "NAME")]
    wiki: String,
    #[arg(long, value_name = "PATH")]
    path: String,
    #[arg(long, value_name = "TEXT", help = "Raw page content")]
    content: Option<String>,
    #[arg(
        long,
        value_name = "FILE",
        conflicts_with = "content",
        help = "Read the page content from a file"
    )]
    content_file: Option<PathBuf>,
    #[arg(long, value_name = "TEXT", help = "Change comment for the page history")]
    comment: Option<String>,
    #[arg(
        long,
        value_name = "ETAG",
        help = "Current page etag; makes the update conditional"
    )]
    etag: Option<String>,
}

#[derive(Debug, Args)]
struct DeletePageArgs {
    #[arg(long, value_name = "NAME")]
    wiki: String,
    #[arg(long, value_name = "PATH")]
    path: String,
}

#[derive(Debug, Args)]
struct AttachmentsArgs {
    #[command(subcommand)]
    command: AttachmentsSubcommand,
}

#[derive(Debug, Subcommand)]
enum AttachmentsSubcommand {
    List(WikiArgs),
    Upload(UploadArgs),
}

#[derive(Debug, Args)]
struct UploadArgs {
    #[arg(long, value_name = "NAME")]
    wiki: String,
    #[arg(long, value_name = "FILE")]
    file: PathBuf,
    #[arg(long, value_name = "NAME", help = "Attachment name; defaults to the file name")]
    name: Option<String>,
    #[arg(long, value_name = "MIME", default_value = "application/octet-stream")]
    content_type: String,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = build_client(cli.config.as_deref())?;

    let result = match &cli.command {
        Commands::ListWikis => to_value(&client.list_wikis()?)?,
        Commands::ListPages(args) => to_value(&client.list_pages(&args.wiki)?)?,
        Commands::GetPage(args) => to_value(&client.get_page_content(
            &args.wiki,
            args.path.as_deref(),
            args.page_id,
        )?)?,
        Commands::Crawl(args) => to_value(&crawl(&client, &args.wiki)?)?,
        Commands::Search(args) => {
            to_value(&search(&client, &args.wiki, &args.query, args.limit)?)?
        }
        Commands::SearchRemote(args) => {
            to_value(&client.search_remote(&args.wiki, &args.query, args.limit)?)?
        }
        Commands::PutPage(args) => {
            let content = resolve_page_content(args)?;
            to_value(&client.put_page(
                &args.wiki,
                &args.path,
                &content,
                args.comment.as_deref(),
                args.etag.as_deref(),
            )?)?
        }
        Commands::DeletePage(args) => to_value(&client.delete_page(&args.wiki, &args.path)?)?,
        Commands::Attachments(args) => match &args.command {
            AttachmentsSubcommand::List(list) => to_value(&client.list_attachments(&list.wiki)?)?,
            AttachmentsSubcommand::Upload(upload) => {
                let bytes = fs::read(&upload.file)
                    .with_context(|| format!("failed to read {}", upload.file.display()))?;
                let name = match &upload.name {
                    Some(name) => name.clone(),
                    None => upload
                        .file
                        .file_name()
                        .map(|name| name.to_string_lossy().to_string())
                        .unwrap_or_default(),
                };
                to_value(&client.upload_attachment(
                    &upload.wiki,
                    &name,
                    &bytes,
                    &upload.content_type,
                )?)?
            }
        },
    };

    emit(&result, cli.output.as_deref())
}

fn build_client(config_override: Option<&std::path::Path>) -> Result<WikiClient> {
    let config_path = config_override
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILENAME));
    let config = load_config(&config_path)?;
    let settings = ClientSettings::resolve(&config)?;
    WikiClient::new(settings)
}

fn resolve_page_content(args: &PutPageArgs) -> Result<String> {
    if let Some(file) = &args.content_file {
        return fs::read_to_string(file)
            .with_context(|| format!("failed to read content from {}", file.display()));
    }
    if let Some(content) = &args.content {
        return Ok(content.clone());
    }
    bail!("page content is required via --content or --content-file");
}

fn to_value<S: serde::Serialize>(value: &S) -> Result<Value> {
    serde_json::to_value(value).context("failed to serialize result")
}

fn emit(result: &Value, output: Option<&std::path::Path>) -> Result<()> {
    let rendered = serde_json::to_string_pretty(result).context("failed to render result")?;
    match output {
        Some(path) => {
            fs::write(path, rendered)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Result written to {}", path.display());
        }
        None => println!("{rendered}"),
    }
    Ok(())
}
