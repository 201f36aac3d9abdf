//! Pipeline command - analyze, generate and optionally execute.

use anyhow::Result;
use clap::Args;
use nimbus_chat::ResultCard;
use serde_json::Value;
use tracing::info;

use super::GlobalArgs;

#[derive(Args)]
pub struct PipelineArgs {
    /// Agent type (panel) to run against, e.g. `aws` or `terraform`
    #[arg(short, long)]
    agent: String,

    /// Requirements as JSON, or plain text
    #[arg(short, long)]
    requirements: String,

    /// Execute the generated plan
    #[arg(long)]
    execute: bool,

    /// Print full stage payloads
    #[arg(long)]
    json: bool,
}

pub async fn execute(global: &GlobalArgs, args: PipelineArgs) -> Result<()> {
    let console = global.console()?;
    console.session().restore().await;
    let chat = console.chat();

    let requirements = serde_json::from_str(&args.requirements)
        .unwrap_or_else(|_| Value::String(args.requirements.clone()));

    info!("Running pipeline for agent '{}'", args.agent);

    println!("🔍 Analyzing...");
    let analysis = chat.analyze(&args.agent, requirements).await?;
    print_card(analysis.card(), args.json)?;

    println!("🛠️  Generating...");
    let plan = chat.generate(&args.agent, &analysis).await?;
    print_card(&plan, args.json)?;

    if !args.execute {
        if plan.correlation_id.is_some() {
            println!("Run again with --execute to apply this plan.");
        }
        return Ok(());
    }

    println!("🚀 Executing...");
    let result = chat.execute(&args.agent).await?;
    print_card(&result, args.json)?;
    Ok(())
}

fn print_card(card: &ResultCard, json: bool) -> Result<()> {
    println!("   ✅ {}", card.summary());
    if json {
        println!("{}", serde_json::to_string_pretty(&card.payload)?);
    }
    Ok(())
}
