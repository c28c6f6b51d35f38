//! `stacks`: command-line front desk for the Stacks circulation server.
//!
//! # Usage
//!
//! ```text
//! stacks --url http://localhost:8080 --user librarian --password secret issue --borrower <id> --title <id>
//! stacks --config ~/.config/stacks/config.toml overdue
//! ```

mod client;
mod render;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client::{ApiClient, ApiConfig};
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "stacks", about = "Staff client for the Stacks circulation server")]
struct Args {
  /// Path to a TOML config file (url, username, password).
  #[arg(short, long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Base URL of the stacks server (default: http://localhost:8080).
  #[arg(long, env = "STACKS_URL")]
  url: Option<String>,

  /// API username.
  #[arg(long, env = "STACKS_USER")]
  user: Option<String>,

  /// API password (plaintext).
  #[arg(long, env = "STACKS_PASSWORD")]
  password: Option<String>,

  /// Print raw JSON instead of a summary.
  #[arg(long)]
  json: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Lend an available copy of a title.
  Issue {
    #[arg(long)]
    borrower: Uuid,
    #[arg(long)]
    title:    Uuid,
  },
  /// Check a loan back in.
  Return { loan: Uuid },
  /// Extend a loan's due date.
  Renew { loan: Uuid },
  /// Join the waiting queue for a title.
  Reserve {
    #[arg(long)]
    borrower: Uuid,
    #[arg(long)]
    title:    Uuid,
  },
  /// Turn an offered reservation into a loan.
  Fulfill { reservation: Uuid },
  /// Withdraw a reservation.
  Cancel {
    reservation: Uuid,
    #[arg(long)]
    reason:      Option<String>,
  },
  /// Settle a pending fine.
  Pay { fine: Uuid },
  /// List overdue loans.
  Overdue {
    #[arg(long)]
    borrower: Option<Uuid>,
  },
  /// List pending fines.
  Fines {
    #[arg(long)]
    borrower: Option<Uuid>,
  },
  /// Expire lapsed pickup offers now.
  Sweep,
}

// ─── Config file ──────────────────────────────────────────────────────────────

/// Shape of the optional TOML config file.
#[derive(Deserialize, Default, Debug)]
struct ConfigFile {
  #[serde(default)]
  url:      String,
  #[serde(default)]
  username: String,
  #[serde(default)]
  password: String,
}

const DEFAULT_URL: &str = "http://localhost:8080";

/// CLI flags override the config file, which overrides defaults.
fn resolve(args: &Args, file: ConfigFile) -> ApiConfig {
  let pick = |flag: &Option<String>, file: String| {
    flag.clone().or_else(|| (!file.is_empty()).then_some(file))
  };
  ApiConfig {
    base_url: pick(&args.url, file.url).unwrap_or_else(|| DEFAULT_URL.to_string()),
    username: pick(&args.user, file.username).unwrap_or_default(),
    password: pick(&args.password, file.password).unwrap_or_default(),
  }
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();

  let file_cfg: ConfigFile = if let Some(path) = &args.config {
    let raw = std::fs::read_to_string(path)
      .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).context("parsing config file")?
  } else {
    ConfigFile::default()
  };

  let api_config = resolve(&args, file_cfg);
  tracing::debug!(url = %api_config.base_url, "connecting");
  let client = ApiClient::new(api_config)?;
  let out = render::Output { json: args.json };

  match args.command {
    Command::Issue { borrower, title } => out.loan(&client.issue(borrower, title).await?),
    Command::Return { loan } => out.returned(&client.return_loan(loan).await?),
    Command::Renew { loan } => out.loan(&client.renew(loan).await?),
    Command::Reserve { borrower, title } => {
      out.reservation(&client.reserve(borrower, title).await?)
    }
    Command::Fulfill { reservation } => out.fulfilled(&client.fulfill(reservation).await?),
    Command::Cancel { reservation, reason } => {
      out.cancelled(&client.cancel(reservation, reason).await?)
    }
    Command::Pay { fine } => out.fine(&client.pay(fine).await?),
    Command::Overdue { borrower } => out.loans(&client.overdue(borrower).await?),
    Command::Fines { borrower } => out.fines(&client.pending_fines(borrower).await?),
    Command::Sweep => out.swept(&client.sweep().await?),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn flags_override_config_file() {
    let args = Args::try_parse_from(["stacks", "--url", "http://desk:9000", "sweep"]).unwrap();
    let file: ConfigFile =
      toml::from_str("url = \"http://other\"\nusername = \"librarian\"\npassword = \"pw\"")
        .unwrap();
    let cfg = resolve(&args, file);
    assert_eq!(cfg.base_url, "http://desk:9000");
    assert_eq!(cfg.username, "librarian");
    assert_eq!(cfg.password, "pw");
  }

  #[test]
  fn defaults_apply_when_nothing_is_set() {
    let args = Args::try_parse_from(["stacks", "overdue"]).unwrap();
    let cfg = resolve(&args, ConfigFile::default());
    assert_eq!(cfg.base_url, DEFAULT_URL);
    assert!(cfg.username.is_empty());
  }

  #[test]
  fn subcommands_parse_ids() {
    let id = Uuid::new_v4();
    let args = Args::try_parse_from([
      "stacks",
      "cancel",
      &id.to_string(),
      "--reason",
      "duplicate request",
    ])
    .unwrap();
    match args.command {
      Command::Cancel { reservation, reason } => {
        assert_eq!(reservation, id);
        assert_eq!(reason.as_deref(), Some("duplicate request"));
      }
      other => panic!("unexpected command {other:?}"),
    }
    assert!(Args::try_parse_from(["stacks", "return", "not-a-uuid"]).is_err());
  }
}
