//! Session commands: login, logout, whoami.

use anyhow::Result;
use clap::Args;
use tracing::info;

use super::GlobalArgs;

#[derive(Args)]
pub struct LoginArgs {
    /// Username
    username: String,

    /// Password
    #[arg(long, env = "NIMBUS_PASSWORD", hide_env_values = true)]
    password: String,
}

pub async fn login(global: &GlobalArgs, args: LoginArgs) -> Result<()> {
    let console = global.console()?;
    info!("Logging in to {}", console.config().api_base_url);

    let user = console.session().login(&args.username, &args.password).await?;
    println!("✅ Logged in as {}", user.display_name());
    if !user.roles.is_empty() {
        println!("   Roles: {}", user.roles.join(", "));
    }
    Ok(())
}

pub async fn logout(global: &GlobalArgs) -> Result<()> {
    let console = global.console()?;
    console.session().logout()?;
    println!("👋 Logged out");
    Ok(())
}

pub async fn whoami(global: &GlobalArgs) -> Result<()> {
    let console = global.console()?;
    let session = console.session();

    if session.restore().await {
        if let Some(user) = session.user() {
            println!("👤 {} ({})", user.display_name(), user.username);
            if let Some(email) = &user.email {
                println!("   Email: {}", email);
            }
        }
    } else {
        println!("Not logged in");
    }
    println!("   Session: {}", session.session_id());
    Ok(())
}
