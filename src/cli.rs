use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::view::View;

/// Browse and maintain the storefront catalog cache
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// TOML config file (defaults to ./storefront.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log formatter to use
    #[arg(long, value_enum, global = true, default_value_t = default_tracing_format())]
    pub tracing: TracingFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the catalog as seen under a selection
    List {
        #[arg(long, value_enum, default_value_t = ViewArg::Home)]
        view: ViewArg,
        /// Category tag, or "all"
        #[arg(long, default_value = "all")]
        category: String,
        /// Case-insensitive name search
        #[arg(long, default_value = "")]
        search: String,
    },
    /// Print the featured carousel
    Featured,
    /// Print a single entry
    Show { id: String },
    /// Fetch the catalog now and rewrite the cache
    Refresh,
    /// Poll an account for changes until interrupted
    Watch {
        #[arg(long)]
        email: String,
    },
    /// Remove the persisted catalog snapshot
    ClearCache,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewArg {
    Home,
    Today,
    Games,
}

impl From<ViewArg> for View {
    fn from(value: ViewArg) -> Self {
        match value {
            ViewArg::Home => View::Home,
            ViewArg::Today => View::Today,
            ViewArg::Games => View::Games,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable output
    Pretty,
    /// One JSON object per event
    Json,
}

fn default_tracing_format() -> TracingFormat {
    if cfg!(debug_assertions) {
        TracingFormat::Pretty
    } else {
        TracingFormat::Json
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_list_selection() {
        let args = Args::parse_from([
            "storefront",
            "list",
            "--view",
            "games",
            "--search",
            "cl",
        ]);
        match args.command {
            Command::List {
                view,
                category,
                search,
            } => {
                assert_eq!(View::from(view), View::Games);
                assert_eq!(category, "all");
                assert_eq!(search, "cl");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let args = Args::parse_from(["storefront", "refresh", "--tracing", "json"]);
        assert_eq!(args.tracing, TracingFormat::Json);
        assert!(matches!(args.command, Command::Refresh));
    }

    #[test]
    fn watch_requires_email() {
        assert!(Args::try_parse_from(["storefront", "watch"]).is_err());
    }
}
