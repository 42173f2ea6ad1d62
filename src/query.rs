//! `mrag query` and `mrag interactive`.

use anyhow::{bail, Result};
use std::io::{self, BufRead, Write};

use message_rag_core::answer::format_response;

use crate::app::App;
use crate::engine::QueryEngine;

async fn ensure_not_empty(app: &App) -> Result<()> {
    if app.gateway.count().await? == 0 {
        bail!("No messages in the index. Run `mrag ingest <file>` first.");
    }
    Ok(())
}

pub async fn run_query(app: &App, question: &str, json: bool) -> Result<()> {
    ensure_not_empty(app).await?;
    let engine = app.query_engine()?;
    let response = engine.query(question).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        println!("Question: {}", question);
        println!();
        println!("{}", format_response(&response));
    }
    Ok(())
}

/// Read a question per line until EOF or `quit`/`exit`/`q`.
pub async fn run_interactive(app: &App) -> Result<()> {
    ensure_not_empty(app).await?;
    let engine = app.query_engine()?;

    println!("Message RAG interactive mode. Type 'quit' to exit.");
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("\n> ");
        io::stdout().flush()?;

        let Some(line) = lines.next() else {
            break;
        };
        let question = line?;
        let question = question.trim();

        if question.is_empty() {
            continue;
        }
        if matches!(question.to_lowercase().as_str(), "quit" | "exit" | "q") {
            break;
        }

        answer_one(&engine, question).await;
    }

    println!("Goodbye.");
    Ok(())
}

async fn answer_one(engine: &QueryEngine, question: &str) {
    match engine.query(question).await {
        Ok(response) => println!("\n{}", format_response(&response)),
        Err(e) => eprintln!("Error: {}", e),
    }
}
