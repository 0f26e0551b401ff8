//! Preflight CLI: the startup gate run before the executor daemon is allowed
//! to take live traffic. Verifies `MODE`/`TEST_MODE` coherence, that the
//! signer adapter is reachable and agrees with this process about mainnet
//! vs testnet, and that required configuration is present. Exits non-zero
//! on the first failing check so a bad deploy never reaches `hlx-executor`.

use anyhow::Result;
use clap::Parser;
use hlx_bins::common::init_logging;
use hlx_core::config::Config;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Preflight checks for the hlx executor")]
struct Args {
    /// Print each check's outcome even when it passes.
    #[arg(long)]
    verbose: bool,
}

struct CheckResult {
    name: &'static str,
    ok: bool,
    detail: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("FAIL config: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config.log_level, config.json_logs)?;

    let results = run_checks(&config).await;

    let mut all_ok = true;
    for result in &results {
        if result.ok {
            if args.verbose {
                println!("PASS {}: {}", result.name, result.detail);
            }
        } else {
            all_ok = false;
            println!("FAIL {}: {}", result.name, result.detail);
        }
    }

    if all_ok {
        println!("preflight OK ({} checks)", results.len());
        Ok(())
    } else {
        std::process::exit(1);
    }
}

async fn run_checks(config: &Config) -> Vec<CheckResult> {
    vec![
        check_mode(config),
        check_live_coins(config),
        check_signer_health(config).await,
        check_mainnet_coherence(config).await,
    ]
}

fn check_mode(config: &Config) -> CheckResult {
    let ok = config.mode == "live" || config.mode == "test";
    CheckResult {
        name: "mode",
        ok,
        detail: format!("MODE={} TEST_MODE={}", config.mode, config.test_mode),
    }
}

fn check_live_coins(config: &Config) -> CheckResult {
    if config.mode != "live" {
        return CheckResult {
            name: "live_enabled_coins",
            ok: true,
            detail: "skipped (MODE != live)".to_string(),
        };
    }
    CheckResult {
        name: "live_enabled_coins",
        ok: !config.live_enabled_coins.is_empty(),
        detail: format!("{} coin(s) enabled", config.live_enabled_coins.len()),
    }
}

async fn check_signer_health(config: &Config) -> CheckResult {
    let url = format!("{}/health", config.signer_adapter_url.trim_end_matches('/'));
    let client = reqwest::Client::new();

    match client.get(&url).timeout(Duration::from_millis(config.signer_timeout_ms)).send().await {
        Ok(resp) if resp.status().is_success() => CheckResult {
            name: "signer_reachable",
            ok: true,
            detail: format!("{} -> {}", url, resp.status()),
        },
        Ok(resp) => CheckResult {
            name: "signer_reachable",
            ok: false,
            detail: format!("{} -> {}", url, resp.status()),
        },
        Err(e) => CheckResult {
            name: "signer_reachable",
            ok: false,
            detail: format!("{} unreachable: {}", url, e),
        },
    }
}

async fn check_mainnet_coherence(config: &Config) -> CheckResult {
    let url = format!("{}/network", config.signer_adapter_url.trim_end_matches('/'));
    let client = reqwest::Client::new();

    match client.get(&url).timeout(Duration::from_millis(config.signer_timeout_ms)).send().await {
        Ok(resp) if resp.status().is_success() => {
            match resp.json::<serde_json::Value>().await {
                Ok(body) => {
                    let signer_mainnet = body.get("mainnet").and_then(|v| v.as_bool());
                    match signer_mainnet {
                        Some(mainnet) if mainnet == config.hl_mainnet => CheckResult {
                            name: "mainnet_coherence",
                            ok: true,
                            detail: format!("executor HL_MAINNET={} matches signer", config.hl_mainnet),
                        },
                        Some(mainnet) => CheckResult {
                            name: "mainnet_coherence",
                            ok: false,
                            detail: format!(
                                "executor HL_MAINNET={} but signer reports mainnet={}",
                                config.hl_mainnet, mainnet
                            ),
                        },
                        None => CheckResult {
                            name: "mainnet_coherence",
                            ok: false,
                            detail: "/network response missing 'mainnet' field".to_string(),
                        },
                    }
                }
                Err(e) => CheckResult {
                    name: "mainnet_coherence",
                    ok: false,
                    detail: format!("/network response not JSON: {}", e),
                },
            }
        }
        // Older signer adapters may not expose /network; don't hard-fail preflight on that alone.
        Ok(resp) => CheckResult {
            name: "mainnet_coherence",
            ok: true,
            detail: format!("{} -> {} (skipping coherence check)", url, resp.status()),
        },
        Err(e) => CheckResult {
            name: "mainnet_coherence",
            ok: true,
            detail: format!("{} unreachable, skipping coherence check: {}", url, e),
        },
    }
}
