//! Offline dealer: samples plaintext `U`/`V`, splits them into additive
//! shares, and for each query samples a DPF key pair plus its sign-alignment
//! bit (§4.2, §4.6).

use crate::dpf::{choose_negate_p0, depth_for_n, generate_dpf, DpfKey};
use crate::error::{Error, Result};
use crate::field::{subm, Share, P};
use rand::Rng;

/// Output of a full dealer run (§4.6), ready to be written to the files
/// named in §6.
pub struct DealerOutput {
    /// P0's additive share of `U` (one row per user).
    pub u0: Vec<Share>,
    /// P1's additive share of `U`.
    pub u1: Vec<Share>,
    /// P0's additive share of `V` (one row per item).
    pub v0: Vec<Share>,
    /// P1's additive share of `V`.
    pub v1: Vec<Share>,
    /// `(user_idx, item_idx)` ground truth pairs, one per query.
    pub queries: Vec<(u64, u64)>,
    /// The user-index column of `queries`, read by the parties.
    pub queries_users: Vec<u64>,
    /// P0's DPF keys, one per query.
    pub dpf0: Vec<DpfKey>,
    /// P1's DPF keys, one per query.
    pub dpf1: Vec<DpfKey>,
    /// Sign-alignment bit per query (§3, §4.3).
    pub negate: Vec<bool>,
}

fn random_matrix<R: Rng>(rows: usize, k: usize, rng: &mut R) -> Vec<i64> {
    (0..rows * k).map(|_| rng.gen_range(0..P)).collect()
}

fn split_matrix<R: Rng>(plain: &[i64], rows: usize, k: usize, rng: &mut R) -> (Vec<Share>, Vec<Share>) {
    let mut s0 = Vec::with_capacity(rows);
    let mut s1 = Vec::with_capacity(rows);
    for r in 0..rows {
        let row = &plain[r * k..(r + 1) * k];
        let share0: Vec<i64> = (0..k).map(|_| rng.gen_range(0..P)).collect();
        let share1: Vec<i64> = (0..k).map(|d| subm(row[d], share0[d])).collect();
        s0.push(Share::from_vec(share0));
        s1.push(Share::from_vec(share1));
    }
    (s0, s1)
}

/// Run the dealer: sample `U` (`m x k`) and `V` (`n x k`), split them, and
/// generate one DPF key pair plus negate bit per query. Item indices in
/// `queries` are drawn uniformly from `[0, n)`; user indices from `[0, m)`.
pub fn run_dealer<R: Rng>(
    m: usize,
    n: usize,
    k: usize,
    num_queries: usize,
    rng: &mut R,
) -> Result<DealerOutput> {
    if m == 0 || n == 0 || k == 0 {
        return Err(Error::InvariantViolation {
            context: format!("dealer dimensions must be positive, got m={m} n={n} k={k}"),
        });
    }

    let u_plain = random_matrix(m, k, rng);
    let v_plain = random_matrix(n, k, rng);
    let (u0, u1) = split_matrix(&u_plain, m, k, rng);
    let (v0, v1) = split_matrix(&v_plain, n, k, rng);

    let mut queries = Vec::with_capacity(num_queries);
    let mut dpf0 = Vec::with_capacity(num_queries);
    let mut dpf1 = Vec::with_capacity(num_queries);
    let mut negate = Vec::with_capacity(num_queries);

    for _ in 0..num_queries {
        let user_idx = rng.gen_range(0..m as u64);
        let item_idx = rng.gen_range(0..n as u64);
        let (k0, k1) = generate_dpf(item_idx, n as u64, rng)?;
        let neg = choose_negate_p0(&k0, &k1, item_idx, n as u64);

        queries.push((user_idx, item_idx));
        dpf0.push(k0);
        dpf1.push(k1);
        negate.push(neg);
    }

    let queries_users = queries.iter().map(|&(u, _)| u).collect();

    Ok(DealerOutput {
        u0,
        u1,
        v0,
        v1,
        queries,
        queries_users,
        dpf0,
        dpf1,
        negate,
    })
}

/// `⌈log2 n⌉`, exposed for binaries that need to size DPF-dependent buffers
/// ahead of generating keys.
pub fn item_domain_depth(n: usize) -> u32 {
    depth_for_n(n as u64)
}
