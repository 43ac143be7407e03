use std::path::Path;
use tracing::{error, info};

use credo_engine::quest::MetricsSnapshot;
use credo_engine::{EngineConfig, Event, ProgressionEngine, Topic};

const TOPICS: [Topic; 7] = [
    Topic::CredoChanged,
    Topic::LevelUp,
    Topic::CredoEarned,
    Topic::CredoSpent,
    Topic::SkillUnlocked,
    Topic::QuestCompleted,
    Topic::QuestClaimed,
];

fn log_event(event: &Event) -> Result<(), String> {
    match event {
        Event::CredoChanged(snapshot) => info!(
            "[credoChanged] balance={} level={} earned={} spent={}",
            snapshot.balance, snapshot.level, snapshot.total_earned, snapshot.total_spent
        ),
        Event::LevelUp {
            new_level,
            required_credo,
        } => info!("[levelUp] level {} (next at {} Credo)", new_level, required_credo),
        Event::CredoEarned { amount, source, .. } => {
            info!("[credoEarned] +{} from {}", amount, source)
        }
        Event::CredoSpent { amount, source, .. } => {
            info!("[credoSpent] -{} for {}", amount, source)
        }
        Event::SkillUnlocked {
            domain,
            category,
            skill_name,
            ..
        } => info!("[skillUnlocked] {}/{}/{}", domain, category, skill_name),
        Event::QuestCompleted { quest_id, title } => {
            info!("[questCompleted] {} ({})", quest_id, title)
        }
        Event::QuestClaimed { quest_id, credo } => info!("[questClaimed] {} +{}", quest_id, credo),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("credo_engine=info".parse()?)
                .add_directive("credo_sim=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(metrics_path) = args.get(1) else {
        error!("Usage: credo-sim <metrics.json> [engine.toml]");
        std::process::exit(2);
    };

    let config = match args.get(2) {
        Some(path) => EngineConfig::load(Path::new(path))?,
        None => EngineConfig::default(),
    };

    let metrics: MetricsSnapshot = serde_json::from_str(&std::fs::read_to_string(metrics_path)?)?;
    info!(
        "Loaded metrics from {}: {} transactions, {} savings accounts",
        metrics_path,
        metrics.transactions.len(),
        metrics.savings_accounts.len()
    );

    let engine = ProgressionEngine::from_config(config)?;
    let bus = engine.bus();
    for topic in TOPICS {
        bus.subscribe_fn(topic, log_event);
    }

    let outcome = engine.refresh_quests(&metrics).await;
    for id in &outcome.unrecognized {
        error!("Quest {} could not be evaluated", id);
    }

    for quest in engine.completed_quests().await {
        if let Some(claim) = engine.claim_quest(&quest.id).await {
            info!("{}: {}", quest.id, claim.message);
        }
    }

    let summary = engine.ledger_summary().await;
    info!(
        "Level {} with {} Credo ({:.1}% to next level)",
        summary.current_level, summary.current_credo, summary.progress
    );

    println!("{}", engine.snapshot().await.to_json()?);
    Ok(())
}
