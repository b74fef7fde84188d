//! mapcast-inspect CLI tool
//!
//! Reads the claim database offline (read-only, safe next to a running daemon).
//!
//! Usage:
//!   mapcast-inspect count
//!   mapcast-inspect claim <ip>
//!   mapcast-inspect rank <colo|region|country> <hourly|daily|weekly|monthly|all-time>
//!   mapcast-inspect recents

use mapcast_core::{rank, recent_feed, Granularity, Window};
use mapcast_query::cycle::now_ms;
use mapcast_query::Storage;
use serde::Serialize;
use std::path::PathBuf;

fn print_usage() {
    eprintln!("mapcast-inspect - Inspect the Mapcast claim database");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  mapcast-inspect count                          Number of stored claims");
    eprintln!("  mapcast-inspect claim <ip>                     Stored claim for an address");
    eprintln!("  mapcast-inspect rank <granularity> <window>    Leaderboard as of now");
    eprintln!("  mapcast-inspect recents                        Recent-claims feed as of now");
    eprintln!();
    eprintln!("Granularities: colo, region, country");
    eprintln!("Windows:       hourly, daily, weekly, monthly, all-time");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  CLAIM_DB_PATH  Claim database directory (default: ./mapcast-data/claims)");
}

fn get_db_path() -> PathBuf {
    std::env::var("CLAIM_DB_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./mapcast-data/claims"))
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", message);
    std::process::exit(1);
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => fail(e),
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    if matches!(args[1].as_str(), "-h" | "--help" | "help") {
        print_usage();
        std::process::exit(0);
    }

    let db_path = get_db_path();
    let storage = Storage::open_read_only(&db_path).unwrap_or_else(|e| {
        fail(format!(
            "Failed to open claim database at {:?}: {}",
            db_path, e
        ))
    });

    match args[1].as_str() {
        "count" => match storage.claim_count() {
            Ok(count) => println!("{}", count),
            Err(e) => fail(e),
        },
        "claim" => {
            let Some(ip) = args.get(2) else {
                fail("claim requires an ip argument");
            };
            match storage.get_claim(ip) {
                Ok(Some(claim)) => print_json(&claim),
                Ok(None) => fail(format!("no claim for {}", ip)),
                Err(e) => fail(e),
            }
        }
        "rank" => {
            if args.len() < 4 {
                fail("rank requires <granularity> and <window> arguments");
            }
            let granularity: Granularity = args[2].parse().unwrap_or_else(|e| fail(e));
            let window: Window = args[3].parse().unwrap_or_else(|e| fail(e));
            let claims = storage.snapshot_claims().unwrap_or_else(|e| fail(e));
            print_json(&rank(&claims, granularity, window, now_ms()));
        }
        "recents" => {
            let claims = storage.snapshot_claims().unwrap_or_else(|e| fail(e));
            print_json(&recent_feed(&claims, now_ms()));
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            std::process::exit(1);
        }
    }
}
