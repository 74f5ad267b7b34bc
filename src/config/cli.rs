use chrono::{DateTime, NaiveDateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::core::pipeline::TIMESTAMP_FORMAT;
use crate::domain::model::{CreateOrderRequest, OrderListQuery};

#[derive(Debug, Clone, Parser)]
#[command(name = "geotax-etl")]
#[command(about = "Price orders by the tax jurisdiction of their delivery point")]
pub struct Cli {
    #[arg(short, long, default_value = "geotax.toml")]
    pub config: PathBuf,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Log process memory and CPU while importing")]
    pub monitor: bool,

    #[arg(long, help = "Keep orders in memory instead of writing the output file")]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Import a CSV file of orders (id,longitude,latitude,timestamp,subtotal)
    Import { file: PathBuf },

    /// Create and persist a single order
    Create {
        #[arg(long, allow_hyphen_values = true)]
        longitude: f64,
        #[arg(long, allow_hyphen_values = true)]
        latitude: f64,
        #[arg(long)]
        subtotal: f64,
        /// RFC 3339 or "YYYY-MM-DD HH:MM:SS[.fff]" (UTC)
        #[arg(long, value_parser = parse_timestamp)]
        timestamp: DateTime<Utc>,
    },

    /// Print the jurisdiction and tax record for a point
    Resolve {
        #[arg(long, allow_hyphen_values = true)]
        longitude: f64,
        #[arg(long, allow_hyphen_values = true)]
        latitude: f64,
    },

    /// Print one stored order
    Show { id: i64 },

    /// Print a page of stored orders in id order
    List {
        #[arg(long, default_value = "1")]
        page: usize,
        #[arg(long, default_value = "50")]
        page_size: usize,
    },
}

impl Command {
    /// Builds the create request when this is a `create` command.
    pub fn create_request(&self) -> Option<CreateOrderRequest> {
        match *self {
            Command::Create {
                longitude,
                latitude,
                subtotal,
                timestamp,
            } => Some(CreateOrderRequest {
                longitude,
                latitude,
                timestamp: Some(timestamp),
                subtotal,
            }),
            _ => None,
        }
    }

    /// Builds the page request when this is a `list` command.
    pub fn list_query(&self) -> Option<OrderListQuery> {
        match *self {
            Command::List { page, page_size } => Some(OrderListQuery { page, page_size }),
            _ => None,
        }
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("invalid timestamp '{}': {}", value, e))
}
