//! `treesync post list|add|show|remove`

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use tabled::{settings::Style, Table, Tabled};

use treesync_content::PostRenderer;
use treesync_core::types::slugify;
use treesync_core::{config, FsPostStore, Post, PostId, PostStatus, PostStore, PostType};

use super::home_dir;

/// Manage posts in the local store.
#[derive(Subcommand, Debug)]
pub enum PostCommand {
    /// List every local post.
    List,

    /// Create a post.
    Add(AddArgs),

    /// Print a post as it would be exported.
    Show {
        id: u64,
    },

    /// Delete a post locally. Use `treesync export --delete` to also remove
    /// it from the remote.
    Remove {
        id: u64,
    },
}

#[derive(Args, Debug)]
pub struct AddArgs {
    #[arg(long, short = 't')]
    pub title: String,

    /// Post body (markdown).
    #[arg(long, conflicts_with = "body_file")]
    pub body: Option<String>,

    /// Read the body from a file.
    #[arg(long)]
    pub body_file: Option<PathBuf>,

    /// Defaults to a slug of the title.
    #[arg(long)]
    pub slug: Option<String>,

    /// post | page | any custom type name.
    #[arg(long = "type", default_value = "post")]
    pub post_type: String,

    #[arg(long)]
    pub draft: bool,

    #[arg(long = "tag")]
    pub tags: Vec<String>,

    #[arg(long = "category")]
    pub categories: Vec<String>,
}

pub fn run(cmd: PostCommand) -> Result<()> {
    let home = home_dir()?;
    let mut store = FsPostStore::open_at(&home).context("failed to open post store")?;
    match cmd {
        PostCommand::List => list(&store),
        PostCommand::Add(args) => add(&mut store, args),
        PostCommand::Show { id } => show(&home, &store, PostId(id)),
        PostCommand::Remove { id } => remove(&mut store, PostId(id)),
    }
}

#[derive(Tabled)]
struct PostRow {
    id: u64,
    title: String,
    #[tabled(rename = "type")]
    post_type: String,
    status: String,
    #[tabled(rename = "remote path")]
    remote_path: String,
}

fn list(store: &FsPostStore) -> Result<()> {
    let posts = store.list().context("failed to list posts")?;
    if posts.is_empty() {
        println!("No posts.");
        println!("Run: treesync post add --title <title>");
        return Ok(());
    }

    let rows: Vec<PostRow> = posts
        .into_iter()
        .map(|p| PostRow {
            id: p.id.0,
            title: p.title,
            post_type: p.post_type.to_string(),
            status: p.status.to_string(),
            remote_path: p.remote_path.unwrap_or_else(|| "-".to_string()),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}

fn add(store: &mut FsPostStore, args: AddArgs) -> Result<()> {
    if args.title.trim().is_empty() {
        bail!("title must not be empty");
    }
    let body = match (args.body, args.body_file) {
        (Some(body), _) => body,
        (None, Some(path)) => fs::read_to_string(&path)
            .with_context(|| format!("cannot read body from '{}'", path.display()))?,
        (None, None) => String::new(),
    };

    let id = store.allocate_id().context("failed to allocate post id")?;
    let mut post = Post::new(id, args.title, body);
    if let Some(slug) = args.slug {
        post.slug = slugify(&slug);
    }
    post.post_type = PostType::from(args.post_type);
    if args.draft {
        post.status = PostStatus::Draft;
    }
    post.tags = args.tags;
    post.categories = args.categories;

    store
        .save(&post)
        .with_context(|| format!("failed to save post {id}"))?;
    println!("✓ Added post {id} '{}'", post.title);
    println!("  Saved to: {}", store.post_path(id).display());
    Ok(())
}

fn show(home: &std::path::Path, store: &FsPostStore, id: PostId) -> Result<()> {
    let post = store
        .get(id)?
        .with_context(|| format!("post {id} not found"))?;
    let site = config::load_at(home).context("failed to load config: run `treesync init` first")?;
    let renderer = PostRenderer::new(&site).context("invalid path templates")?;
    let exported = renderer
        .export(&post)
        .with_context(|| format!("failed to render post {id}"))?;

    println!("==> {} <==", exported.path);
    print!("{}", exported.content);
    if !exported.content.ends_with('\n') {
        println!();
    }
    Ok(())
}

fn remove(store: &mut FsPostStore, id: PostId) -> Result<()> {
    let post = store
        .get(id)?
        .with_context(|| format!("post {id} not found"))?;
    store
        .delete(id)
        .with_context(|| format!("failed to delete post {id}"))?;
    println!("✓ Removed post {id} '{}'", post.title);
    if let Some(path) = post.remote_path {
        println!("  Still on the remote at {path}; a running daemon removes it on the next sync.");
    }
    Ok(())
}
