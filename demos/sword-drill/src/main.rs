//! Sword drill: a runnable Berean server with a small built-in question
//! set. Point any websocket client at it, say `Hello`, create a room,
//! share the code, race.
//!
//! ```text
//! RUST_LOG=berean=debug,sword_drill=info cargo run -p sword-drill
//! ```

use std::sync::Arc;

use berean::BereanServer;
use berean_engine::{FixedBank, Question};
use berean_protocol::QuestionId;
use tracing_subscriber::EnvFilter;

fn questions() -> Vec<Question> {
    let raw: &[(&str, &[&str], usize)] = &[
        (
            "Who led Israel across the Jordan into Canaan?",
            &["Moses", "Joshua", "Caleb", "Gideon"],
            1,
        ),
        (
            "On which island was Paul shipwrecked?",
            &["Cyprus", "Crete", "Malta", "Patmos"],
            2,
        ),
        (
            "Who hid the spies in Jericho?",
            &["Deborah", "Rahab", "Ruth", "Esther"],
            1,
        ),
        (
            "How many days was Jonah inside the great fish?",
            &["One", "Three", "Seven", "Forty"],
            1,
        ),
        (
            "Which prophet confronted the prophets of Baal on Carmel?",
            &["Elisha", "Isaiah", "Elijah", "Jeremiah"],
            2,
        ),
        (
            "Who was the first king of Israel?",
            &["David", "Saul", "Solomon", "Samuel"],
            1,
        ),
        (
            "In which town was Jesus born?",
            &["Nazareth", "Jerusalem", "Bethlehem", "Capernaum"],
            2,
        ),
        (
            "Who interpreted Pharaoh's dreams?",
            &["Daniel", "Joseph", "Jacob", "Benjamin"],
            1,
        ),
    ];

    raw.iter()
        .enumerate()
        .map(|(i, (prompt, options, correct))| Question {
            id: QuestionId(i as u64 + 1),
            prompt: (*prompt).to_string(),
            options: options.iter().map(|o| (*o).to_string()).collect(),
            correct: *correct,
            time_limit: None,
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let bank = Arc::new(FixedBank::new(questions()));
    let server = BereanServer::builder()
        .bind("127.0.0.1:8080")
        .build(bank)
        .await?;

    tracing::info!(addr = %server.local_addr()?, "sword drill ready");
    server.run().await?;
    Ok(())
}
