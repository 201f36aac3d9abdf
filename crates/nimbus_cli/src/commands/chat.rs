//! Chat command - interactive console with the requirements wizard.

use anyhow::Result;
use clap::Args;
use nimbus_chat::{fields_for, ChatError, ChatOutcome, ConsoleContext};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use super::{print_turn, prompt, GlobalArgs};

#[derive(Args)]
pub struct ChatArgs {
    /// Send one message and exit
    #[arg(short, long)]
    message: Option<String>,
}

type Input = Lines<BufReader<Stdin>>;

pub async fn execute(global: &GlobalArgs, args: ChatArgs) -> Result<()> {
    let console = global.console()?;
    let authenticated = console.init().await;
    if !authenticated {
        println!("Chatting anonymously (run `nimbus login` to sign in)");
    }

    let mut input = BufReader::new(tokio::io::stdin()).lines();

    if let Some(message) = args.message {
        handle(&console, &mut input, &message).await?;
        console.dispose();
        return Ok(());
    }

    println!("Type a message, /execute <agent> to run the last plan, or /quit.");
    loop {
        prompt("you> ")?;
        let Some(line) = input.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            _ => {}
        }

        if let Some(agent) = line.strip_prefix("/execute ") {
            // Failures are already in the transcript
            let _ = console.chat().execute(agent.trim()).await;
            if let Some(turn) = console.ui().last_turn() {
                print_turn(&turn);
            }
            continue;
        }

        handle(&console, &mut input, line).await?;
    }

    console.dispose();
    Ok(())
}

async fn handle(console: &ConsoleContext, input: &mut Input, message: &str) -> Result<()> {
    match console.send_chat(message).await? {
        ChatOutcome::Ignored => {}
        ChatOutcome::Replied(turn) => print_turn(&turn),
        ChatOutcome::WizardOpened(steps) => {
            let titles: Vec<_> = steps.iter().map(|s| s.title()).collect();
            println!("📝 Requirements wizard: {}", titles.join(" → "));
            println!("   Enter to keep the suggested value, /cancel to abort.");
            run_wizard(console, input).await?;
        }
    }
    Ok(())
}

async fn run_wizard(console: &ConsoleContext, input: &mut Input) -> Result<()> {
    let wizard = console.wizard();

    for step in wizard.visible_steps() {
        println!();
        println!("== {} ({:.0}%) ==", step.title(), wizard.progress() * 100.0);
        for field in fields_for(step) {
            let current = wizard
                .state()
                .and_then(|s| s.field_values.get(field.key).cloned());
            let Some(value) = ask(input, field.label, field.required, current.as_deref()).await? else {
                wizard.close();
                println!("Wizard cancelled");
                return Ok(());
            };
            if !value.is_empty() {
                wizard.set_field(field.key, value)?;
            }
        }
        wizard.next()?;
    }

    loop {
        match console.submit_wizard().await {
            Ok(Some(turn)) => {
                print_turn(&turn);
                return Ok(());
            }
            Ok(None) => return Ok(()),
            Err(ChatError::MissingField { field, label, .. }) => {
                println!("⚠️  {} is required", label);
                let Some(value) = ask(input, &label, true, None).await? else {
                    wizard.close();
                    println!("Wizard cancelled");
                    return Ok(());
                };
                wizard.set_field(&field, value)?;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Prompt for one field. `None` means cancel (or end of input).
async fn ask(input: &mut Input, label: &str, required: bool, current: Option<&str>) -> Result<Option<String>> {
    let marker = if required { " *" } else { "" };
    match current {
        Some(value) => prompt(&format!("   {}{} [{}]: ", label, marker, value))?,
        None => prompt(&format!("   {}{}: ", label, marker))?,
    }

    let Some(line) = input.next_line().await? else {
        return Ok(None);
    };
    let line = line.trim();
    if line == "/cancel" {
        return Ok(None);
    }
    Ok(Some(line.to_string()))
}
