//! `seedharvest poll`: run poll passes against the native OS binding.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use seedharvest_core::{DigestAccumulator, EntropyPoller, PollReport, platform_info};

pub struct PollCommandConfig<'a> {
    pub count: usize,
    pub interval_ms: u64,
    pub config_path: Option<&'a str>,
    pub json: bool,
}

pub fn run(cfg: PollCommandConfig<'_>) {
    let config = match super::load_config(cfg.config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            std::process::exit(1);
        }
    };

    let poller = EntropyPoller::native(&config);
    let acc = DigestAccumulator::new();

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || r.store(false, Ordering::SeqCst)) {
        log::warn!("cannot install Ctrl+C handler: {e}");
    }

    if !cfg.json {
        println!("Platform: {}", platform_info());
        println!(
            "Toggle {}: hardware counters {}",
            config.toggle_var,
            if poller.context().toggle.resolve() { "on" } else { "off" }
        );
    }

    let mut pass = 0usize;
    let mut last_ok = false;
    while running.load(Ordering::SeqCst) && (cfg.count == 0 || pass < cfg.count) {
        if pass > 0 {
            std::thread::sleep(Duration::from_millis(cfg.interval_ms));
            if !running.load(Ordering::SeqCst) {
                break;
            }
        }
        pass += 1;

        let report = poller.poll_report(&acc);
        last_ok = report.success;
        if cfg.json {
            match serde_json::to_string(&report) {
                Ok(line) => println!("{line}"),
                Err(e) => eprintln!("Error serializing report: {e}"),
            }
        } else {
            print_report(pass, &report);
        }
    }

    if !cfg.json {
        let totals = acc.totals();
        println!(
            "\n{pass} pass(es): {} samples, {} bytes, {} bytes credited",
            totals.samples, totals.total_bytes, totals.total_credit
        );
        let digest: String = acc.digest().iter().map(|b| format!("{b:02x}")).collect();
        println!("Accumulator digest: {digest}");
    }

    if !last_ok {
        std::process::exit(1);
    }
}

fn print_report(pass: usize, r: &PollReport) {
    println!("\n{}", "=".repeat(68));
    println!(
        "PASS {pass}: {} ({}/{} sources delivered, {:.3}s)",
        if r.success { "OK" } else { "FAILED" },
        r.delivered_count(),
        r.outcomes.len(),
        r.elapsed_secs
    );
    println!("{}", "=".repeat(68));
    println!(
        "{:<16} {:>4} {:>9} {:>7} {:>8}  {}",
        "Source", "OK", "Bytes", "Credit", "Time", "Note"
    );
    println!("{}", "-".repeat(68));
    for o in &r.outcomes {
        let ok = if o.delivered() { "✓" } else { "✗" };
        println!(
            "{:<16} {:>4} {:>9} {:>7} {:>7.3}s  {}",
            o.name,
            ok,
            o.bytes,
            o.credit,
            o.time_secs,
            o.skipped.as_deref().unwrap_or("")
        );
    }
    println!(
        "{:<16} {:>4} {:>9} {:>7}",
        "total",
        "",
        r.total_bytes(),
        r.total_credit()
    );
}
