//! Output formatting utilities

use colored::*;
use rhythm_types::{Post, SortResult};
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed table format
    #[default]
    Table,
    /// JSON format
    Json,
}

/// One ranked post as a table row
#[derive(Debug, Serialize, Tabled)]
pub struct PostRow {
    #[tabled(rename = "Rank")]
    pub rank: usize,
    #[tabled(rename = "Post")]
    pub id: u64,
    #[tabled(rename = "Author")]
    pub author: String,
    #[tabled(rename = "Score")]
    pub score: String,
    #[tabled(rename = "Title")]
    pub title: String,
}

impl PostRow {
    fn from_post(rank: usize, post: &Post) -> Self {
        Self {
            rank,
            id: post.id,
            author: post.author.full_username(),
            score: post.sort.map_or_else(|| "-".to_string(), |s| format!("{s:.3}")),
            title: post.title.clone().unwrap_or_default(),
        }
    }
}

pub fn post_rows(result: &SortResult) -> Vec<PostRow> {
    result
        .posts
        .iter()
        .enumerate()
        .map(|(i, post)| PostRow::from_post(i + 1, post))
        .collect()
}

/// Print a vector of items in the specified format
pub fn print_output<T: Serialize + Tabled>(data: Vec<T>, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if data.is_empty() {
                println!("{}", "No results".dimmed());
            } else {
                println!("{}", Table::new(data));
            }
        }
        OutputFormat::Json => print_single(&data),
    }
}

/// Print a single item as JSON
pub fn print_single<T: Serialize>(data: &T) {
    match serde_json::to_string_pretty(data) {
        Ok(json) => println!("{}", json),
        Err(e) => print_error(&format!("could not serialize output: {}", e)),
    }
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow(), message);
}
