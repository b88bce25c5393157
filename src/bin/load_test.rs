//! Load Testing Tool
//!
//! Fires concurrent joins at one free event and checks that admissions never
//! exceed capacity.
//!
//! Run with: cargo run --bin load_test --release -- --capacity 50 --joiners 500

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rand::Rng;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use event_settlement::domain::{JoiningFee, OperationContext};
use event_settlement::gateway::MockGateway;
use event_settlement::handlers::{JoinEventCommand, JoinOutcome, RegistrationCoordinator};
use event_settlement::ledger::{CapacityLedger, NewEvent, ParticipantRepository};

fn arg(args: &[String], name: &str, default: i32) -> i32 {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    let capacity = arg(&args, "--capacity", 50);
    let joiners = arg(&args, "--joiners", 500);

    let database_url = std::env::var("DATABASE_URL")?;

    println!("Load Test - {} joiners racing for {} slots", joiners, capacity);
    println!("Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&database_url)
        .await?;

    let host_id = Uuid::new_v4();
    let ledger = CapacityLedger::new(pool.clone());
    let event = ledger
        .create_event(NewEvent {
            host_id,
            title: "Load test event".to_string(),
            event_date: Utc::now() + chrono::Duration::days(7),
            min_participants: 1,
            max_participants: capacity,
            joining_fee: JoiningFee::free(),
        })
        .await?;

    let coordinator = Arc::new(RegistrationCoordinator::new(
        pool.clone(),
        Arc::new(MockGateway::new()),
        "usd",
    ));

    let start = Instant::now();
    let mut tasks = Vec::with_capacity(joiners as usize);

    for _ in 0..joiners {
        let coordinator = coordinator.clone();
        let event_id = event.id;
        let jitter = rand::thread_rng().gen_range(0..20);

        tasks.push(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(jitter)).await;
            let user_id = Uuid::new_v4();
            let context = OperationContext::new().with_request_user(user_id);
            coordinator
                .request_join(JoinEventCommand::new(event_id, user_id), &context)
                .await
        }));
    }

    let mut admitted = 0u64;
    let mut rejected = 0u64;
    let mut failed = 0u64;

    for task in tasks {
        match task.await? {
            Ok(JoinOutcome::JoinedFree { .. }) => admitted += 1,
            Ok(JoinOutcome::Rejected(_)) => rejected += 1,
            Ok(JoinOutcome::PaymentSessionCreated { .. }) | Err(_) => failed += 1,
        }
    }

    let elapsed = start.elapsed();

    let final_state = ledger
        .get(event.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("event {} disappeared", event.id))?;
    let participant_rows = ParticipantRepository::new(pool.clone())
        .count_active(event.id)
        .await?;

    println!("\n=== Load Test Results ===");
    println!("Joiners: {}", joiners);
    println!("Admitted: {}", admitted);
    println!("Rejected: {}", rejected);
    println!("Failed: {}", failed);
    println!("Time: {:.2}s", elapsed.as_secs_f64());
    println!("Rate: {:.0} joins/sec", joiners as f64 / elapsed.as_secs_f64());
    println!(
        "Final state: {}/{} ({}), participant rows: {}",
        final_state.current_participants,
        final_state.max_participants,
        final_state.status,
        participant_rows
    );

    let consistent = final_state.current_participants <= final_state.max_participants
        && i64::from(final_state.current_participants) == participant_rows
        && admitted == participant_rows as u64;

    if !consistent {
        anyhow::bail!("capacity invariant violated");
    }
    println!("Capacity invariant holds");

    Ok(())
}
