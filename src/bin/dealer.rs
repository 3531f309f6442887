//! Offline dealer binary: samples `U`/`V`, splits them into shares, and
//! writes every file the party and verifier binaries read (§4.6, §6).

use anyhow::{Context, Result};
use clap::Parser;
use mpc_reco::dealer::run_dealer;
use mpc_reco::io_files::{
    write_dpf_keys, write_ground_truth_queries, write_matrix, write_negate_bits,
    write_user_queries,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Sample a random user/item model and a query tape, splitting both into
/// shares and DPF keys for the two online parties.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct DealerArgs {
    /// Number of users (rows of U).
    m: usize,

    /// Number of items (rows of V).
    n: usize,

    /// Feature dimension (columns of U and V).
    k: usize,

    /// Number of queries to sample.
    queries: usize,

    /// RNG seed for reproducible runs. Omit to seed from OS entropy.
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = DealerArgs::parse();
    let span = tracing::info_span!("role", id = "dealer");
    let _enter = span.enter();

    let mut rng = match args.seed {
        Some(s) => ChaCha8Rng::seed_from_u64(s),
        None => ChaCha8Rng::from_entropy(),
    };

    tracing::info!(m = args.m, n = args.n, k = args.k, queries = args.queries, "sampling model");
    let out = run_dealer(args.m, args.n, args.k, args.queries, &mut rng)
        .with_context(|| "failed to generate dealer output")?;

    write_matrix("U0.txt", &out.u0).with_context(|| "writing U0.txt")?;
    write_matrix("U1.txt", &out.u1).with_context(|| "writing U1.txt")?;
    write_matrix("V0.txt", &out.v0).with_context(|| "writing V0.txt")?;
    write_matrix("V1.txt", &out.v1).with_context(|| "writing V1.txt")?;
    write_ground_truth_queries("queries.txt", &out.queries).with_context(|| "writing queries.txt")?;
    write_user_queries("queries_users.txt", &out.queries_users)
        .with_context(|| "writing queries_users.txt")?;
    write_dpf_keys("DPF0.txt", &out.dpf0).with_context(|| "writing DPF0.txt")?;
    write_dpf_keys("DPF1.txt", &out.dpf1).with_context(|| "writing DPF1.txt")?;
    write_negate_bits("DPF_NEG.txt", &out.negate).with_context(|| "writing DPF_NEG.txt")?;

    tracing::info!("dealer output written");
    Ok(())
}
