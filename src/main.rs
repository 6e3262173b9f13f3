//! SceneSmith - CLI entry point.
//!
//! Reads a logline from the arguments (or asks for one), runs the writers' room and
//! prints each act of the result.

use std::io::{self, BufRead, Write};

use scenesmith::{config::Config, cost::CostLedger, logging, SceneMeta, SceneStudio};
use tracing::{error, info};

const PREVIEW_CHARS: usize = 200;
const RULE_WIDTH: usize = 80;

fn main() -> anyhow::Result<()> {
    // The pipeline is strictly sequential; one thread is enough.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async_main())
}

async fn async_main() -> anyhow::Result<()> {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("missing configuration, fix and retry");
            std::process::exit(2);
        }
    };

    logging::init(&config.logging);
    info!("Starting SceneSmith");

    let logline = match logline_from_args() {
        Some(logline) => Some(logline),
        None => prompt_for_logline()?,
    };
    let logline = match logline {
        Some(logline) => logline,
        None => {
            eprintln!("Please provide a non-empty logline.");
            std::process::exit(1);
        }
    };

    println!("\nStarting mixed-model production...");
    println!("GPT for structure and staging, Claude for psychology, dialogue and review\n");

    let studio = match SceneStudio::from_config(&config).await {
        Ok(studio) => studio,
        Err(e) => {
            error!("Studio setup failed: {}", e);
            eprintln!("{}", e);
            eprintln!("missing configuration, fix and retry");
            std::process::exit(2);
        }
    };

    match studio.generate_scene(&logline).await {
        Ok(meta) => {
            display(&meta, studio.ledger());
            Ok(())
        }
        Err(e) => {
            error!("Production failed: {}", e);
            eprintln!("{}", e);
            if let Some(audit) = e.audit_log() {
                eprintln!("\nAUDIT LOG");
                for entry in audit.entries() {
                    eprintln!("- {}", entry);
                }
            }
            eprintln!("pipeline failed after {} attempts, see audit log", e.attempts());
            std::process::exit(1);
        }
    }
}

fn logline_from_args() -> Option<String> {
    let joined = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    let trimmed = joined.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn prompt_for_logline() -> anyhow::Result<Option<String>> {
    print!("Enter a logline: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let trimmed = line.trim();
    Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

fn heading(title: &str) {
    println!("\n{}", title);
    println!("{}", "-".repeat(40));
}

fn display(meta: &SceneMeta, ledger: &CostLedger) {
    println!("{}", "=".repeat(RULE_WIDTH));
    println!("LOGLINE: {}", meta.logline);
    println!(
        "Attempts: {} | Verdict: {} | Status: {}",
        meta.attempt_count, meta.verdict, meta.phase
    );
    println!("{}", "=".repeat(RULE_WIDTH));

    heading("ACT I: PRE-PRODUCTION");
    println!("DRAMATURGE: Structural Analysis");
    println!("{}", preview(&meta.structural_analysis));
    if let Some(bible) = &meta.character_bible {
        println!("\nCHARACTER CREATOR: Character Bible");
        println!("{}", preview(bible));
    }

    heading("ACT II: PRODUCTION");
    println!("SCENE ARCHITECT: Outline");
    println!("{}", preview(&meta.scene_outline));
    println!("\nDIALOGUE SPECIALIST: First Draft");
    println!("{}", preview(&meta.dialogue));

    heading("ACT III: POST-PRODUCTION");
    println!("SHOWRUNNER'S CRITIQUE: {}", meta.critique);
    println!("REVISION DIRECTIVE: {}", meta.revision_directive);
    println!("\nFINAL SCENE");
    println!("{}", "=".repeat(40));
    println!("{}", meta.final_scene);

    if !meta.audit_log.is_empty() {
        heading("AUDIT LOG");
        for entry in &meta.audit_log {
            println!("- {}", entry);
        }
    }

    println!("\n{}", "=".repeat(RULE_WIDTH));
    println!("PRODUCTION COST BREAKDOWN");
    println!("{}", "=".repeat(RULE_WIDTH));
    for line in ledger.summary_lines() {
        println!("{}", line);
    }
    println!("\nTOTAL PRODUCTION COST: ${:.4}", meta.total_cost);
    println!("{}", "=".repeat(RULE_WIDTH));
}
