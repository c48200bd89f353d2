use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use pdf_chat_core::{
    make_file_key, AwsCredentials, BlobStore, ChatError, ChatRepository, ChatService,
    ContextAssembler, Embedder, FakeEmbedder, IngestionOptions, IngestionPipeline,
    LopdfExtractor, OpenAiChatModel, OpenAiEmbedder, PgChatRepository, PineconeStore,
    S3BlobStore, EMBEDDING_DIMENSIONS,
};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-chat", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// OpenAI API key (embeddings and chat completions)
    #[arg(long, env = "OPENAI_API_KEY", default_value = "")]
    openai_api_key: String,

    /// Pinecone index endpoint, e.g. https://my-index-abc123.svc.pinecone.io
    #[arg(long, env = "PINECONE_HOST")]
    pinecone_host: String,

    /// Pinecone API key
    #[arg(long, env = "PINECONE_API_KEY", default_value = "")]
    pinecone_api_key: String,

    /// S3 bucket holding uploaded documents (required for upload)
    #[arg(long, env = "S3_BUCKET", default_value = "")]
    s3_bucket: String,

    /// S3 bucket region
    #[arg(long, env = "AWS_REGION", default_value = "us-east-2")]
    s3_region: String,

    /// Acting user identity
    #[arg(long, env = "PDF_CHAT_USER")]
    user: Option<String>,

    /// Use deterministic fake embeddings instead of the hosted service.
    /// Development only: retrieval quality is meaningless with this on.
    #[arg(long, default_value_t = false)]
    fake_embeddings: bool,

    /// Embedding worker pool width during ingestion
    #[arg(long, default_value = "8")]
    embed_concurrency: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a PDF, index it, and open a chat for it.
    Upload {
        /// Path to the PDF file
        #[arg(long)]
        file: String,
    },
    /// Ask a question in an existing chat.
    Ask {
        /// Chat id
        #[arg(long)]
        chat_id: i64,
        /// The question
        #[arg(long)]
        message: String,
    },
    /// List your chats.
    Chats,
    /// Show your most recently created chat.
    Latest,
    /// Print a chat transcript.
    Messages {
        /// Chat id
        #[arg(long)]
        chat_id: i64,
    },
    /// Delete all of your chats and their messages.
    ClearHistory,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    if let Err(failure) = run(cli).await {
        // Internal detail goes to the log only; the user gets an opaque
        // message so upstream errors never leak credentials or payloads.
        error!(error = ?failure, "command failed");
        eprintln!("something went wrong; details were logged");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let repository = PgChatRepository::connect(&cli.database_url).await?;
    repository.ensure_schema().await?;

    let embedder: Arc<dyn Embedder> = if cli.fake_embeddings {
        info!("using fake embeddings; retrieval quality is not meaningful");
        Arc::new(FakeEmbedder::default())
    } else {
        Arc::new(OpenAiEmbedder::new(cli.openai_api_key.clone()))
    };
    let vectors = Arc::new(PineconeStore::new(
        &cli.pinecone_host,
        &cli.pinecone_api_key,
        EMBEDDING_DIMENSIONS,
    ));

    match cli.command {
        Command::Upload { file } => {
            let user = require_user(cli.user.as_deref())?;
            if cli.s3_bucket.is_empty() {
                return Err(anyhow::anyhow!("S3_BUCKET is not set"));
            }
            let path = Path::new(&file);
            let file_name = path
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| anyhow::anyhow!("path has no file name: {file}"))?
                .to_string();
            let bytes = tokio::fs::read(path).await?;

            let blobs = S3BlobStore::new(&cli.s3_bucket, &cli.s3_region, AwsCredentials::from_env()?);
            let file_key = blobs.put(&make_file_key(&file_name), bytes).await?;
            let pdf_url = blobs.public_url(&file_key);
            info!(file_key = %file_key, "uploaded to blob store");

            let pipeline = IngestionPipeline::new(
                blobs,
                Arc::clone(&embedder),
                Arc::clone(&vectors),
                LopdfExtractor,
                IngestionOptions {
                    embed_concurrency: cli.embed_concurrency,
                    ..IngestionOptions::default()
                },
            );
            let summary = pipeline.ingest(&file_key).await?;

            let chat = repository
                .create_chat(&file_name, &pdf_url, user, &file_key)
                .await?;
            println!(
                "chat {} created for {} ({} pages, {} vectors) at {}",
                chat.id,
                chat.pdf_name,
                summary.page_count,
                summary.chunk_count,
                Utc::now().to_rfc3339()
            );
        }
        Command::Ask { chat_id, message } => {
            let user = require_user(cli.user.as_deref())?;
            let context = ContextAssembler::new(Arc::clone(&embedder), Arc::clone(&vectors));
            let model = OpenAiChatModel::new(cli.openai_api_key.clone());
            let service = ChatService::new(repository, context, model);

            let reply = service.respond(user, chat_id, &message).await?;
            println!("{}", reply.content);
        }
        Command::Chats => {
            let user = require_user(cli.user.as_deref())?;
            let chats = repository.chats_for_user(user).await?;
            if chats.is_empty() {
                println!("no chats yet");
            }
            for chat in chats {
                println!(
                    "[{}] {} ({}) created {}",
                    chat.id,
                    chat.pdf_name,
                    chat.file_key,
                    chat.created_at.to_rfc3339()
                );
            }
        }
        Command::Latest => {
            let user = require_user(cli.user.as_deref())?;
            match repository.latest_chat_for_user(user).await? {
                Some(chat) => println!(
                    "[{}] {} ({}) created {}",
                    chat.id,
                    chat.pdf_name,
                    chat.file_key,
                    chat.created_at.to_rfc3339()
                ),
                None => println!("no chats yet"),
            }
        }
        Command::Messages { chat_id } => {
            let user = require_user(cli.user.as_deref())?;
            let chat = repository
                .chat_by_id(chat_id)
                .await?
                .ok_or(ChatError::ChatNotFound(chat_id))?;
            if chat.user_id != user {
                return Err(ChatError::Unauthorized.into());
            }

            for message in repository.messages_for_chat(chat_id).await? {
                println!(
                    "[{}] {}: {}",
                    message.created_at.to_rfc3339(),
                    message.role.as_str(),
                    message.content
                );
            }
        }
        Command::ClearHistory => {
            let user = require_user(cli.user.as_deref())?;
            let removed = repository.clear_history(user).await?;
            println!("{removed} chat(s) deleted");
        }
    }

    Ok(())
}

fn require_user(user: Option<&str>) -> Result<&str, ChatError> {
    match user {
        Some(id) if !id.trim().is_empty() => Ok(id),
        _ => Err(ChatError::Unauthorized),
    }
}
