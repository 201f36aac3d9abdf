//! Platform status and agent listing.

use anyhow::Result;
use clap::Args;
use tracing::warn;

use super::GlobalArgs;

#[derive(Args)]
pub struct StatusArgs {
    /// Print raw JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
pub struct AgentsArgs {
    /// Show the capabilities of this agent type
    #[arg(short, long)]
    agent: Option<String>,
}

pub async fn status(global: &GlobalArgs, args: StatusArgs) -> Result<()> {
    let console = global.console()?;
    console.session().restore().await;
    console.refresh_dashboard().await?;

    let Some(dashboard) = console.snapshot().dashboard else {
        anyhow::bail!("Dashboard data unavailable");
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&dashboard)?);
        return Ok(());
    }

    println!("🩺 Platform: {}", dashboard.status.status);
    for (key, value) in &dashboard.status.details {
        println!("   {}: {}", key, value);
    }

    match console.api().api_status().await {
        Ok(api) => println!("🔌 Chat API: {}", api),
        Err(e) => warn!("Chat API status unavailable: {}", e),
    }

    println!();
    println!("🤖 Agents ({}):", dashboard.agents.len());
    for agent in &dashboard.agents {
        println!(
            "   - {} [{}] {}",
            agent.agent_type,
            agent.status.as_deref().unwrap_or("unknown"),
            agent.name
        );
    }
    Ok(())
}

pub async fn agents(global: &GlobalArgs, args: AgentsArgs) -> Result<()> {
    let console = global.console()?;
    console.session().restore().await;

    if let Some(agent) = args.agent {
        let capabilities = console.chat().capabilities(&agent).await?;
        println!("{}", serde_json::to_string_pretty(&capabilities)?);
        return Ok(());
    }

    let agents = console.api().list_agents().await?;
    if agents.is_empty() {
        println!("No agents registered");
    }
    for agent in agents {
        println!("🤖 {} - {}", agent.agent_type, agent.name);
        if let Some(description) = &agent.description {
            println!("   {}", description);
        }
        if !agent.capabilities.is_empty() {
            println!("   Capabilities: {}", agent.capabilities.join(", "));
        }
    }
    Ok(())
}
