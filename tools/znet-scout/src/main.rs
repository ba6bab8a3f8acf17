// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! znet-scout - Discover znet entities on the local network
//!
//! Sends scout messages and prints the hellos received, or runs a responder
//! that answers scout messages on behalf of a fake entity.

use clap::Parser;
use colored::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use znet::config::{
    self, Properties, SessionConfig, ZN_CONFIG_MULTICAST_ADDRESS_KEY,
    ZN_CONFIG_MULTICAST_INTERFACE_KEY, ZN_CONFIG_SCOUTING_DELAY_KEY,
    ZN_CONFIG_SCOUTING_TIMEOUT_KEY,
};
use znet::{scout_configured, Hello, PeerId, ScoutResponder, WhatAmI};

/// Discover znet entities
#[derive(Parser, Debug)]
#[command(name = "znet-scout")]
#[command(version = "0.1.0")]
#[command(about = "Discover znet routers, peers and clients by scouting")]
struct Args {
    /// Entity kinds to look for: router, peer, client, or a combination (router|peer)
    #[arg(short, long, default_value = "router|peer")]
    what: WhatAmI,

    /// Scouting window in seconds (0 = one scout, report what already arrived).
    /// Defaults to the configured scouting timeout.
    #[arg(short, long)]
    timeout: Option<f64>,

    /// Scouting address (multicast group or unicast host:port)
    #[arg(short, long, default_value = config::DEFAULT_MULTICAST_ADDRESS)]
    address: String,

    /// Interface address used for multicast, or "auto"
    #[arg(short, long, default_value = config::DEFAULT_MULTICAST_INTERFACE)]
    interface: String,

    /// Seconds between repeated scout messages
    #[arg(long)]
    delay: Option<f64>,

    /// Output format: pretty, json
    #[arg(short, long, default_value = "pretty")]
    format: OutputFormat,

    /// Answer scout messages instead of sending them
    #[arg(long)]
    respond: bool,

    /// Kind announced by the responder
    #[arg(long, default_value = "peer")]
    whatami: WhatAmI,

    /// Locators announced by the responder (repeatable)
    #[arg(short, long)]
    locator: Vec<String>,

    /// Quiet mode - compact output
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Clone, Debug)]
enum OutputFormat {
    Pretty,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "p" => Ok(OutputFormat::Pretty),
            "json" | "j" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}", s)),
        }
    }
}

fn main() {
    let args = Args::parse();
    znet::logging::init_logger();

    let result = if args.respond {
        respond(&args)
    } else {
        discover(&args)
    };
    if let Err(e) = result {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn properties(args: &Args) -> Properties {
    let mut props = config::config_peer()
        .with(ZN_CONFIG_MULTICAST_ADDRESS_KEY, args.address.as_str())
        .with(ZN_CONFIG_MULTICAST_INTERFACE_KEY, args.interface.as_str());
    if let Some(delay) = args.delay {
        props.insert(ZN_CONFIG_SCOUTING_DELAY_KEY, delay.to_string());
    }
    if let Some(timeout) = args.timeout {
        props.insert(ZN_CONFIG_SCOUTING_TIMEOUT_KEY, timeout.to_string());
    }
    props
}

// ============================================================================
// Discovery
// ============================================================================

fn discover(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let props = properties(args);
    let period = SessionConfig::from_properties(&props)?.scouting_timeout;

    if !args.quiet {
        eprintln!(
            "{} Scouting for {} on {} ({:.1}s)",
            ">>>".green().bold(),
            args.what,
            args.address,
            period.as_secs_f64()
        );
    }

    let started = Instant::now();
    let hellos = scout_configured(args.what, &props)?;
    log::debug!("Scouting returned after {:?}", started.elapsed());

    match args.format {
        OutputFormat::Pretty => print_pretty(&hellos, args.quiet),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&to_json(&hellos))?),
    }
    Ok(())
}

fn print_pretty(hellos: &[Hello], quiet: bool) {
    if hellos.is_empty() {
        if !quiet {
            println!("{}", "No entity answered".yellow());
        }
        return;
    }

    for hello in hellos {
        if quiet {
            println!("{}", hello);
            continue;
        }
        let pid = hello
            .pid
            .as_ref()
            .map_or_else(|| "-".to_string(), ToString::to_string);
        println!(
            "{} {} {}",
            format!("[{}]", hello.whatami).cyan().bold(),
            pid.white(),
            hello.locators.join(", ").dimmed()
        );
    }
    if !quiet {
        println!("{}", format!("{} entities", hellos.len()).dimmed());
    }
}

fn to_json(hellos: &[Hello]) -> serde_json::Value {
    serde_json::Value::Array(
        hellos
            .iter()
            .map(|hello| {
                serde_json::json!({
                    "whatami": hello.whatami.to_string(),
                    "pid": hello.pid.as_ref().map(ToString::to_string),
                    "locators": hello.locators,
                })
            })
            .collect(),
    )
}

// ============================================================================
// Responder
// ============================================================================

fn respond(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let hello = Hello {
        whatami: args.whatami,
        pid: Some(PeerId::generate()),
        locators: args.locator.clone(),
    };
    let responder = ScoutResponder::spawn(&properties(args), hello.clone())?;

    if !args.quiet {
        eprintln!(
            "{} Answering scout messages on {} as {}",
            ">>>".green().bold(),
            responder.local_addr(),
            hello
        );
        eprintln!("{}", "    Press Ctrl+C to stop".dimmed());
    }

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
    }

    let answered = responder.answered();
    responder.stop();
    if !args.quiet {
        eprintln!("{} Answered {} scout messages", ">>>".green().bold(), answered);
    }
    Ok(())
}
