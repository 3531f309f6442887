//! Party binary (P0 or P1): runs the online per-query protocol of §4.5 and,
//! on P0, writes the result and completion-flag files of §4.5.7.

use anyhow::{Context, Result};
use clap::Parser;
use mpc_reco::channel::{close_helper, connect_helper, connect_peer};
use mpc_reco::field::Share;
use mpc_reco::io_files::{
    read_dpf_keys, read_matrix, read_negate_bits, read_user_queries, write_done_flag,
    write_indexed_rows,
};
use mpc_reco::protocol::{
    item_scatter, oblivious_select, user_finalize, user_update_share,
};
use rand::thread_rng;
use std::collections::BTreeMap;

/// Run one party's half of the online update protocol.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct PartyArgs {
    /// Number of users (rows of U).
    m: usize,

    /// Number of items (rows of V).
    n: usize,

    /// Feature dimension (columns of U and V).
    k: usize,

    /// Number of queries in the tape.
    queries: usize,

    /// This party's role, 0 or 1. Falls back to the `ROLE` environment
    /// variable so the same image can run unmodified for both roles.
    #[arg(long)]
    role: Option<u8>,
}

fn resolve_role(args: &PartyArgs) -> Result<u8> {
    if let Some(role) = args.role {
        return Ok(role);
    }
    let from_env = std::env::var("ROLE").with_context(|| "neither --role nor ROLE is set")?;
    from_env
        .trim()
        .parse::<u8>()
        .with_context(|| format!("ROLE={from_env:?} is not 0 or 1"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = PartyArgs::parse();
    let role = resolve_role(&args)?;
    if role != 0 && role != 1 {
        anyhow::bail!("role must be 0 or 1, got {role}");
    }

    let span = tracing::info_span!("role", id = role);
    let _enter = span.enter();

    let (u_file, v_file) = if role == 0 {
        ("U0.txt", "V0.txt")
    } else {
        ("U1.txt", "V1.txt")
    };
    let dpf_file = if role == 0 { "DPF0.txt" } else { "DPF1.txt" };

    let mut u_shares = read_matrix(u_file, args.k).with_context(|| format!("reading {u_file}"))?;
    let mut v_shares = read_matrix(v_file, args.k).with_context(|| format!("reading {v_file}"))?;
    let query_users =
        read_user_queries("queries_users.txt").with_context(|| "reading queries_users.txt")?;
    let dpf_keys = read_dpf_keys(dpf_file).with_context(|| format!("reading {dpf_file}"))?;
    let negate_bits = read_negate_bits("DPF_NEG.txt").with_context(|| "reading DPF_NEG.txt")?;

    if query_users.len() != args.queries
        || dpf_keys.len() != args.queries
        || negate_bits.len() != args.queries
    {
        anyhow::bail!(
            "file counts disagree with --queries: users={} dpf={} negate={} expected={}",
            query_users.len(),
            dpf_keys.len(),
            negate_bits.len(),
            args.queries
        );
    }

    tracing::info!("connecting to peer and helper");
    let mut peer = connect_peer(role).with_context(|| "connecting to peer")?;
    let mut helper = connect_helper(role).with_context(|| "connecting to helper")?;

    let mut rng = thread_rng();
    let n = args.n as u64;
    let mut reconstructed_results: BTreeMap<u64, Share> = BTreeMap::new();

    for (q, &user_idx) in query_users.iter().enumerate() {
        tracing::info!(query = q, user = user_idx, "processing query");
        let dpf_key = &dpf_keys[q];
        // DPF_NEG.txt carries P0's negate bit; P1 always applies the
        // complementary bit so exactly one party flips its sign vector.
        let negate = if role == 0 {
            negate_bits[q]
        } else {
            !negate_bits[q]
        };

        let v_sel_b = oblivious_select(
            role,
            &mut peer,
            &mut helper,
            dpf_key,
            negate,
            &v_shares,
            n,
            args.k,
        )
        .with_context(|| format!("oblivious select at query {q}"))?;

        let u_i_b = u_shares[user_idx as usize].as_slice().to_vec();

        let (delta_b, m_b) = user_update_share(&mut peer, &mut helper, role, &u_i_b, &v_sel_b)
            .with_context(|| format!("user update share at query {q}"))?;

        item_scatter(
            &mut peer,
            dpf_key,
            negate,
            dpf_key.final_cw,
            &m_b,
            &mut v_shares,
            n,
        )
        .with_context(|| format!("item scatter at query {q}"))?;

        let (new_u_b, u_i_prime) = user_finalize(
            &mut peer,
            &mut helper,
            role,
            &u_i_b,
            delta_b,
            &v_sel_b,
            &mut rng,
        )
        .with_context(|| format!("user finalize at query {q}"))?;

        u_shares[user_idx as usize] = Share::from_vec(new_u_b);
        reconstructed_results.insert(user_idx, Share::from_vec(u_i_prime));
    }

    if role == 0 {
        close_helper(&mut helper).with_context(|| "closing helper")?;

        // Request the peer's final V shares and reconstruct.
        peer.write_i64(-1).with_context(|| "requesting V dump")?;
        peer.flush()?;
        let mut v_rows = Vec::with_capacity(v_shares.len());
        for (idx, row) in v_shares.iter().enumerate() {
            let peer_row = peer.read_i64_array(args.k)?;
            let reconstructed: Vec<i64> = row
                .as_slice()
                .iter()
                .zip(&peer_row)
                .map(|(&a, &b)| mpc_reco::field::addm(a, b))
                .collect();
            v_rows.push((idx as u64, Share::from_vec(reconstructed)));
        }
        write_indexed_rows("mpc_V_results.txt", &v_rows)
            .with_context(|| "writing mpc_V_results.txt")?;

        let mut u_rows = Vec::with_capacity(reconstructed_results.len());
        for (idx, share) in &reconstructed_results {
            u_rows.push((*idx, share.clone()));
        }
        write_indexed_rows("mpc_results.txt", &u_rows).with_context(|| "writing mpc_results.txt")?;

        write_done_flag("mpc_results.done").with_context(|| "writing mpc_results.done")?;
        tracing::info!("wrote results and completion flag");
    } else {
        // Respond to P0's V-dump request with this party's local shares.
        let sentinel = peer.read_i64().with_context(|| "reading V-dump request")?;
        if sentinel == -1 {
            for row in &v_shares {
                peer.write_i64_array(row.as_slice())?;
            }
            peer.flush()?;
        }
    }

    Ok(())
}
