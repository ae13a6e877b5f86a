use std::sync::Arc;
use std::time::Instant;

use helm::engine::SoftEngine;
use helm::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

type AppResult<T> = std::result::Result<T, Box<dyn std::error::Error>>;

struct RunResult {
    tier: SecurityTier,
    scheme: Scheme,
    init_ms: f64,
    keygen_ms: f64,
    enc_ms: f64,
    dec_ms: f64,
    max_error: f64,
    public_key_bytes: usize,
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1e3
}

fn run(tier: SecurityTier, scheme: Scheme, seed: u64) -> AppResult<RunResult> {
    let params = preset_for(tier);
    let mut helm = Orchestrator::with_engine(Arc::new(SoftEngine::with_seed(seed)));

    let start = Instant::now();
    helm.initialize(scheme, &params)?;
    let init_ms = elapsed_ms(start);

    let start = Instant::now();
    helm.generate_keys()?;
    let keygen_ms = elapsed_ms(start);

    let capacity = helm.capacity()?;
    let (input, expected): (HostArray, Vec<f64>) = match scheme {
        Scheme::Integer => {
            let values: Vec<i64> = (0..capacity as i64).collect();
            let expected = values.iter().map(|&v| v as f64).collect();
            (values.into(), expected)
        }
        Scheme::ApproxReal => {
            let values: Vec<f64> = (0..capacity).map(|i| (i as f64 * 0.01).sin()).collect();
            (values.clone().into(), values)
        }
    };

    let start = Instant::now();
    let cipher_text = helm.encrypt(input)?;
    let enc_ms = elapsed_ms(start);

    let start = Instant::now();
    let decrypted = helm.decrypt(&cipher_text)?;
    let dec_ms = elapsed_ms(start);

    let max_error = decrypted
        .to_f64_vec()
        .iter()
        .zip(&expected)
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max);
    info!(
        ?tier,
        %scheme,
        preview = %render_vector(&decrypted, 4, 5),
        "round trip complete"
    );

    let public_key_bytes = helm.save_public_key()?.len();
    Ok(RunResult { tier, scheme, init_ms, keygen_ms, enc_ms, dec_ms, max_error, public_key_bytes })
}

fn print_table(results: &[RunResult]) {
    println!("Encrypt/decrypt round trip at full capacity (soft engine)");
    println!(
        "{:<8} {:<6} {:>10} {:>10} {:>10} {:>10} {:>12} {:>12}",
        "tier", "scheme", "init_ms", "keygen_ms", "enc_ms", "dec_ms", "max_error", "pk_bytes"
    );
    for r in results {
        println!(
            "{:<8} {:<6} {:>10.3} {:>10.3} {:>10.3} {:>10.3} {:>12.3e} {:>12}",
            format!("{:?}", r.tier),
            r.scheme.to_string(),
            r.init_ms,
            r.keygen_ms,
            r.enc_ms,
            r.dec_ms,
            r.max_error,
            r.public_key_bytes
        );
    }
}

fn main() -> AppResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("helm=info".parse()?))
        .init();

    let mut tiers: Vec<SecurityTier> = std::env::args().skip(1).map(|name| SecurityTier::from_name(&name)).collect();
    if tiers.is_empty() {
        tiers.push(SecurityTier::Low);
    }

    let mut results = Vec::new();
    for (i, tier) in tiers.into_iter().enumerate() {
        for scheme in [Scheme::Integer, Scheme::ApproxReal] {
            results.push(run(tier, scheme, i as u64)?);
        }
    }
    print_table(&results);
    Ok(())
}
