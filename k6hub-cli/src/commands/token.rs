//! Mint admin bearer tokens signed with the configured secret

use std::time::Duration;

use anyhow::{Result, bail};
use chrono::Utc;
use clap::{Args, Subcommand};
use k6hub_core::{AdminAuthConfig, Role, TokenValidator};

use crate::config::ConfigLoader;

#[derive(Args)]
pub struct TokenArgs {
    #[command(subcommand)]
    pub command: TokenCommands,
}

#[derive(Subcommand)]
pub enum TokenCommands {
    /// Print a signed token for the admin API
    Mint {
        /// Token subject; becomes the creator of tasks made with it
        #[arg(short, long, default_value = "admin")]
        subject: String,

        /// Role claim (admin or user)
        #[arg(short, long, default_value = "admin")]
        role: Role,

        /// Lifetime in seconds (defaults to `auth.token_ttl_secs`)
        #[arg(long)]
        ttl_secs: Option<u64>,
    },
}

pub fn run(args: TokenArgs) -> Result<()> {
    match args.command {
        TokenCommands::Mint {
            subject,
            role,
            ttl_secs,
        } => {
            let config = ConfigLoader::load()?;
            let token = mint(config.auth, &subject, role, ttl_secs)?;
            println!("{}", token);
            Ok(())
        }
    }
}

fn mint(auth: AdminAuthConfig, subject: &str, role: Role, ttl_secs: Option<u64>) -> Result<String> {
    if !auth.is_configured() {
        bail!("auth.jwt_secret is not set; add it to the [auth] section of your config");
    }
    let ttl = Duration::from_secs(ttl_secs.unwrap_or(auth.token_ttl_secs));
    let validator = TokenValidator::new(auth);
    Ok(validator.mint(subject, role, ttl, Utc::now())?)
}
