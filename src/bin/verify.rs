//! Verifier binary (§4.9): reconstructs plaintext `U`/`V` from the dealer's
//! share files, replays `queries.txt` directly against them, and checks the
//! replayed values against the protocol's output files. Never touches a
//! socket, a DPF key, or a Beaver triple — a correctness oracle independent
//! of the online machinery it is checking.

use anyhow::{Context, Result};
use clap::Parser;
use mpc_reco::field::{mulm, subm, Share};
use mpc_reco::io_files::{
    read_ground_truth_queries, read_indexed_rows, read_matrix, read_user_queries,
};
use std::collections::BTreeSet;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

/// Reconstruct plaintext `U`/`V` and replay every query directly,
/// comparing against the online protocol's result files.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct VerifyArgs {
    /// Number of users (rows of U).
    m: usize,

    /// Number of items (rows of V).
    n: usize,

    /// Feature dimension (columns of U and V).
    k: usize,

    /// Number of queries in the tape.
    queries: usize,

    /// How many times to poll for `mpc_results.done` before giving up.
    #[arg(long, default_value_t = 100)]
    max_retries: u32,

    /// Delay between polls for `mpc_results.done`.
    #[arg(long, default_value_t = 100)]
    retry_millis: u64,
}

fn wait_for_done_flag(args: &VerifyArgs) -> Result<()> {
    let path = Path::new("mpc_results.done");
    for attempt in 0..args.max_retries {
        if path.exists() {
            return Ok(());
        }
        tracing::debug!(attempt, "mpc_results.done not yet present, retrying");
        sleep(Duration::from_millis(args.retry_millis));
    }
    anyhow::bail!(
        "mpc_results.done did not appear after {} retries",
        args.max_retries
    );
}

fn reconstruct(a: &[Share], b: &[Share]) -> Result<Vec<Share>> {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| x.add(y).map_err(Into::into))
        .collect()
}

/// Replay the query tape in plaintext, mutating `u` and `v` in place
/// exactly the way the online protocol's per-query steps do: the update
/// each side applies uses the *other* side's pre-query snapshot, so both
/// must be captured before either is written back.
fn replay(u: &mut [Share], v: &mut [Share], queries: &[(u64, u64)]) -> Result<()> {
    for &(user, item) in queries {
        let u_i = u[user as usize].clone();
        let v_j = v[item as usize].clone();
        let prod = u_i.dot_plain(&v_j)?;
        let delta = subm(1, prod);

        let m: Vec<i64> = u_i.as_slice().iter().map(|&x| mulm(delta, x)).collect();
        v[item as usize] = v[item as usize].add(&Share::from_vec(m))?;

        let term: Vec<i64> = v_j.as_slice().iter().map(|&x| mulm(delta, x)).collect();
        u[user as usize] = u_i.add(&Share::from_vec(term))?;
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let span = tracing::info_span!("role", id = "verify");
    let _enter = span.enter();

    let args = VerifyArgs::parse();

    let u0 = read_matrix("U0.txt", args.k).with_context(|| "reading U0.txt")?;
    let u1 = read_matrix("U1.txt", args.k).with_context(|| "reading U1.txt")?;
    let v0 = read_matrix("V0.txt", args.k).with_context(|| "reading V0.txt")?;
    let v1 = read_matrix("V1.txt", args.k).with_context(|| "reading V1.txt")?;
    if u0.len() != args.m || v0.len() != args.n {
        anyhow::bail!(
            "share file row counts disagree with --m/--n: U has {}, V has {}",
            u0.len(),
            v0.len()
        );
    }
    let mut u = reconstruct(&u0, &u1).with_context(|| "reconstructing U")?;
    let mut v = reconstruct(&v0, &v1).with_context(|| "reconstructing V")?;

    let queries =
        read_ground_truth_queries("queries.txt").with_context(|| "reading queries.txt")?;
    let query_users =
        read_user_queries("queries_users.txt").with_context(|| "reading queries_users.txt")?;
    if queries.len() != args.queries || query_users.len() != args.queries {
        anyhow::bail!(
            "query file lengths disagree with --queries: queries.txt={} queries_users.txt={} expected={}",
            queries.len(),
            query_users.len(),
            args.queries
        );
    }
    for (idx, (user, _item)) in queries.iter().enumerate() {
        if *user != query_users[idx] {
            anyhow::bail!(
                "queries.txt and queries_users.txt disagree at row {idx}: {user} vs {}",
                query_users[idx]
            );
        }
    }

    replay(&mut u, &mut v, &queries).with_context(|| "replaying query tape")?;

    wait_for_done_flag(&args)?;

    let touched: BTreeSet<u64> = query_users.iter().copied().collect();
    let got_users =
        read_indexed_rows("mpc_results.txt", args.k).with_context(|| "reading mpc_results.txt")?;
    let got_v =
        read_indexed_rows("mpc_V_results.txt", args.k).with_context(|| "reading mpc_V_results.txt")?;

    let mut mismatches = 0usize;

    if got_users.len() != touched.len() {
        tracing::error!(
            expected = touched.len(),
            got = got_users.len(),
            "mpc_results.txt row count does not match the touched-user set"
        );
        mismatches += 1;
    }
    for (idx, row) in &got_users {
        let expected = &u[*idx as usize];
        if row != expected {
            tracing::error!(
                user = idx,
                expected = ?expected.as_slice(),
                got = ?row.as_slice(),
                "user row mismatch"
            );
            mismatches += 1;
        }
    }

    if got_v.len() != v.len() {
        tracing::error!(
            expected = v.len(),
            got = got_v.len(),
            "mpc_V_results.txt row count does not match n"
        );
        mismatches += 1;
    }
    for (idx, row) in &got_v {
        let expected = &v[*idx as usize];
        if row != expected {
            tracing::error!(
                item = idx,
                expected = ?expected.as_slice(),
                got = ?row.as_slice(),
                "item row mismatch"
            );
            mismatches += 1;
        }
    }

    if mismatches > 0 {
        anyhow::bail!("{mismatches} mismatch(es) against the direct-replay ground truth");
    }

    tracing::info!(
        queries = args.queries,
        users_checked = got_users.len(),
        items_checked = got_v.len(),
        "verification passed"
    );
    Ok(())
}
