//! Sign in with a one-time code, restore the session on later runs, and list
//! the current loads for a tenant.
//!
//! ```text
//! FREIGHTLINE_API_URL=https://api.freightline.app \
//!     cargo run --example dispatch_session -- dispatch@acme.test acme
//! ```

use anyhow::{bail, Context};
use freightline::prelude::*;
use serde_json::Value;
use std::io::BufRead;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    freightline::telemetry::init()?;

    let mut args = std::env::args().skip(1);
    let Some(email) = args.next() else {
        bail!("usage: dispatch_session <email> [organization]");
    };
    let organization = args.next();

    let config = ClientConfig::from_env()?;
    let host = match &organization {
        Some(slug) => format!("{slug}.{}", config.base_domain),
        None => config.base_domain.clone(),
    };

    let store = FileCredentialStore::open(".freightline-session.json")
        .context("opening session file")?;

    let client = FreightlineClient::builder()
        .config(config)
        .credential_store(Arc::new(store))
        .location_source(Arc::new(StaticLocation::new(Location::new(host, "/loads"))))
        .on_session_expired(Arc::new(|login_path: &str| {
            eprintln!("Session expired; run again to sign in ({login_path}).");
        }))
        .build()?;

    let me = match client.restore_session().await? {
        Some(me) => me,
        None => {
            client.request_login_code(&email).await?;
            eprint!("Code sent to {email}. Enter code: ");
            let code = std::io::stdin()
                .lock()
                .lines()
                .next()
                .context("no code entered")??;
            client.verify_code(&email, code.trim()).await?;
            client.current_user().await?
        }
    };

    println!("Signed in as {}", me.user.email);
    for membership in &me.memberships {
        println!("  {} ({})", membership.organization.name, membership.role);
    }

    if let Some(slug) = client.tenant() {
        if !me.is_member_of(&slug) {
            bail!("{} is not a member of {slug}", me.user.email);
        }
        let loads: Value = client.get_json("/v1/loads").await?;
        println!("{slug} loads: {loads:#}");
    }

    Ok(())
}
