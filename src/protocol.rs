//! The two-party online protocol: one query at a time, coroutine-structured
//! over a socket to the peer and a socket to the helper (§4.5).
//!
//! Every function here takes `role: u8` (0 or 1) and performs exactly the
//! sends/receives its counterpart on the other party performs, in the same
//! order, so the pair never deadlocks waiting on each other or on the
//! helper.

use crate::beaver::{combine_share, TripleShare};
use crate::channel::Channel;
use crate::dpf::{eval_signs, DpfKey};
use crate::field::{addm, mulm, norm, subm, Share, INV2, P};
use crate::error::Result;

/// Request `k` Beaver triples from the helper and unpack the reply. Only
/// P0 sends the request count (§4.4): the helper reads `k` from the P0
/// socket alone and pushes the matching triple batch out to both sockets,
/// so P1 only ever reads.
fn request_triples(role: u8, helper: &mut Channel, k: usize) -> Result<TripleShare> {
    if role == 0 {
        helper.write_i64(k as i64)?;
        helper.flush()?;
    }
    let words = helper.read_i64_array(k * 3)?;
    TripleShare::from_wire(&words)
}

/// Shared dot product of length-`k` shares `x_b`, `y_b` (§4.5.1).
pub fn shared_dot(
    role: u8,
    peer: &mut Channel,
    helper: &mut Channel,
    x_b: &[i64],
    y_b: &[i64],
) -> Result<i64> {
    let k = x_b.len();
    let triple = request_triples(role, helper, k)?;

    let alpha_b: Vec<i64> = (0..k).map(|i| addm(x_b[i], triple.a[i])).collect();
    let beta_b: Vec<i64> = (0..k).map(|i| addm(y_b[i], triple.b[i])).collect();

    peer.write_i64_array(&alpha_b)?;
    peer.write_i64_array(&beta_b)?;
    peer.flush()?;
    let alpha_peer = peer.read_i64_array(k)?;
    let beta_peer = peer.read_i64_array(k)?;

    let alpha: Vec<i64> = (0..k).map(|i| addm(alpha_b[i], alpha_peer[i])).collect();
    let beta: Vec<i64> = (0..k).map(|i| addm(beta_b[i], beta_peer[i])).collect();

    Ok(combine_share(&triple, &alpha, &beta, y_b))
}

/// Shared scalar-vector product: scalar share `s_b` times vector share
/// `v_b` of length `k` (§4.5.2).
pub fn scalar_vec(
    role: u8,
    peer: &mut Channel,
    helper: &mut Channel,
    s_b: i64,
    v_b: &[i64],
) -> Result<Vec<i64>> {
    let k = v_b.len();
    let triple = request_triples(role, helper, k)?;
    let a_scalar = triple.a[0];

    let alpha_b = addm(s_b, a_scalar);
    let beta_b: Vec<i64> = (0..k).map(|i| addm(v_b[i], triple.b[i])).collect();

    peer.write_i64(alpha_b)?;
    peer.write_i64_array(&beta_b)?;
    peer.flush()?;
    let alpha_peer = peer.read_i64()?;
    let beta_peer = peer.read_i64_array(k)?;

    let alpha = addm(alpha_b, alpha_peer);
    let beta: Vec<i64> = (0..k).map(|i| addm(beta_b[i], beta_peer[i])).collect();

    // x is the broadcast scalar s_b, so alpha_i == alpha for every i; the
    // same combine_share identity applies with y_b == v_b.
    let alpha_vec = vec![alpha; k];
    Ok((0..k)
        .map(|i| {
            let mut z = mulm(alpha_vec[i], v_b[i]);
            z = subm(z, mulm(beta[i], triple.a[i]));
            addm(z, triple.c[i])
        })
        .collect())
}

/// Tell the helper to close: P0 sends a zero-or-negative sentinel (§4.5.7,
/// §4.4).
pub fn close_helper(helper: &mut Channel) -> Result<()> {
    helper.write_i64(0)?;
    helper.flush()
}

/// DPF-based oblivious selection (§4.5.3): derive a share of `v_j` from the
/// full `V_shares` table (`n` rows of length `k`) without revealing `j`.
pub fn oblivious_select(
    role: u8,
    peer: &mut Channel,
    helper: &mut Channel,
    dpf_key: &DpfKey,
    negate: bool,
    v_shares: &[Share],
    n: u64,
    k: usize,
) -> Result<Vec<i64>> {
    let signs = eval_signs(dpf_key, n, negate);
    let share_vec: Vec<i64> = signs
        .iter()
        .map(|&s| if s > 0 { INV2 } else { norm(-INV2) })
        .collect();

    let mut v_sel = vec![0i64; k];
    for d in 0..k {
        let column: Vec<i64> = v_shares.iter().map(|row| row.as_slice()[d]).collect();
        v_sel[d] = shared_dot(role, peer, helper, &share_vec, &column)?;
    }
    Ok(v_sel)
}

/// User-side update share (§4.5.4): returns `(delta_b, m_b)` where
/// `delta_b` is this party's share of `1 - <u_i, v_sel>` and `m_b` is this
/// party's share of `u_i * delta` (the item-side update delta).
pub fn user_update_share(
    peer: &mut Channel,
    helper: &mut Channel,
    role: u8,
    u_i_b: &[i64],
    v_sel_b: &[i64],
) -> Result<(i64, Vec<i64>)> {
    let prod_b = shared_dot(role, peer, helper, u_i_b, v_sel_b)?;
    let delta_b = if role == 0 {
        subm(1, prod_b)
    } else {
        subm(0, prod_b)
    };
    let m_b = scalar_vec(role, peer, helper, delta_b, u_i_b)?;
    Ok((delta_b, m_b))
}

/// Item-side oblivious scatter (§4.5.5): add `M` (carried as `m_b`, this
/// party's share) into `V_shares` at the hidden row `j`, leaving every other
/// row untouched, without revealing `j`. `final_cw_b` is this party's DPF
/// final correction word.
pub fn item_scatter(
    peer: &mut Channel,
    dpf_key: &DpfKey,
    negate: bool,
    final_cw_b: i64,
    m_b: &[i64],
    v_shares: &mut [Share],
    n: u64,
) -> Result<()> {
    let k = m_b.len();
    let masked_b: Vec<i64> = m_b.iter().map(|&x| subm(x, final_cw_b)).collect();

    peer.write_i64_array(&masked_b)?;
    peer.flush()?;
    let masked_peer = peer.read_i64_array(k)?;

    let fcwm: Vec<i64> = (0..k).map(|d| addm(masked_b[d], masked_peer[d])).collect();

    let signs = eval_signs(dpf_key, n, negate);
    for (idx, &s) in signs.iter().enumerate() {
        let coeff = if s > 0 { INV2 } else { norm(-INV2) };
        v_shares[idx].add_scaled_in_place(coeff, &Share::from_vec(fcwm.clone()))?;
    }
    Ok(())
}

/// User finalize (§4.5.6): compute `u_i' = u_i + ScalarVec(delta_b,
/// v_sel_b)`, reconstruct, and re-share with fresh randomness. `role == 0`
/// draws the fresh share and sends `(u_i' - r)` to P1; both overwrite their
/// share of `u_i`. Returns `(new_share, u_i_prime)`: the fresh share to keep
/// computing with, and the plaintext-reconstructed `u_i'` both parties
/// compute before re-sharing, which P0 records as the result row.
pub fn user_finalize<R: rand::Rng>(
    peer: &mut Channel,
    helper: &mut Channel,
    role: u8,
    u_i_b: &[i64],
    delta_b: i64,
    v_sel_b: &[i64],
    rng: &mut R,
) -> Result<(Vec<i64>, Vec<i64>)> {
    let k = u_i_b.len();
    let term_b = scalar_vec(role, peer, helper, delta_b, v_sel_b)?;
    let new_u_b: Vec<i64> = (0..k).map(|d| addm(u_i_b[d], term_b[d])).collect();

    peer.write_i64_array(&new_u_b)?;
    peer.flush()?;
    let peer_u = peer.read_i64_array(k)?;
    let u_i_prime: Vec<i64> = (0..k).map(|d| addm(new_u_b[d], peer_u[d])).collect();

    if role == 0 {
        let r: Vec<i64> = (0..k).map(|_| rng.gen_range(0..P)).collect();
        let p1_share: Vec<i64> = (0..k).map(|d| subm(u_i_prime[d], r[d])).collect();
        peer.write_i64_array(&p1_share)?;
        peer.flush()?;
        Ok((r, u_i_prime))
    } else {
        let new_share = peer.read_i64_array(k)?;
        Ok((new_share, u_i_prime))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beaver::generate_triples;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::net::{TcpListener, TcpStream};

    fn loopback_pair() -> (Channel, Channel) {
        let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let addr = listener.local_addr().unwrap();
        let client = std::thread::spawn(move || TcpStream::connect(addr).unwrap());
        let (server, _) = listener.accept().unwrap();
        (
            Channel::from_stream(server).unwrap(),
            Channel::from_stream(client.join().unwrap()).unwrap(),
        )
    }

    /// Mimic the real helper binary: read the request count from P0's
    /// socket only, then push the matching triple slice out to both.
    fn fake_helper(mut ch0: Channel, mut ch1: Channel, t0: TripleShare, t1: TripleShare) {
        std::thread::spawn(move || {
            let k = ch0.read_i64().unwrap();
            if k <= 0 {
                return;
            }
            let k = k as usize;
            ch0.write_i64_array(&t0.to_wire()[..k * 3]).unwrap();
            ch0.flush().unwrap();
            ch1.write_i64_array(&t1.to_wire()[..k * 3]).unwrap();
            ch1.flush().unwrap();
        });
    }

    #[test]
    fn shared_dot_matches_plaintext() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let k = 3;
        let (t0, t1) = generate_triples(k, &mut rng);

        let (peer0, peer1) = loopback_pair();
        let (helper_srv0, mut helper_cli0) = loopback_pair();
        let (helper_srv1, mut helper_cli1) = loopback_pair();

        fake_helper(helper_srv0, helper_srv1, t0, t1);

        let x = vec![2i64, 3, 5];
        let y = vec![7i64, 11, 13];
        let x0 = vec![1i64, 1, 1];
        let x1: Vec<i64> = x.iter().zip(&x0).map(|(&a, &b)| subm(a, b)).collect();
        let y0 = vec![9i64, 4, 6];
        let y1: Vec<i64> = y.iter().zip(&y0).map(|(&a, &b)| subm(a, b)).collect();

        let mut peer0 = peer0;
        let mut peer1 = peer1;
        let h0 =
            std::thread::spawn(move || shared_dot(0, &mut peer0, &mut helper_cli0, &x0, &y0));
        let h1 =
            std::thread::spawn(move || shared_dot(1, &mut peer1, &mut helper_cli1, &x1, &y1));

        let z0 = h0.join().unwrap().unwrap();
        let z1 = h1.join().unwrap().unwrap();

        let expected = x.iter().zip(&y).fold(0i64, |acc, (&a, &b)| addm(acc, mulm(a, b)));
        assert_eq!(norm(z0 + z1), expected);
    }

    #[test]
    fn scalar_vec_matches_plaintext() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let k = 2;
        let (t0, t1) = generate_triples(k, &mut rng);

        let (peer0, peer1) = loopback_pair();
        let (helper_srv0, mut helper_cli0) = loopback_pair();
        let (helper_srv1, mut helper_cli1) = loopback_pair();

        fake_helper(helper_srv0, helper_srv1, t0, t1);

        let s = 6i64;
        let v = vec![10i64, 20];
        let s0 = 2i64;
        let s1 = subm(s, s0);
        let v0 = vec![4i64, 7];
        let v1: Vec<i64> = v.iter().zip(&v0).map(|(&a, &b)| subm(a, b)).collect();

        let mut peer0 = peer0;
        let mut peer1 = peer1;
        let h0 = std::thread::spawn(move || scalar_vec(0, &mut peer0, &mut helper_cli0, s0, &v0));
        let h1 = std::thread::spawn(move || scalar_vec(1, &mut peer1, &mut helper_cli1, s1, &v1));

        let r0 = h0.join().unwrap().unwrap();
        let r1 = h1.join().unwrap().unwrap();

        for d in 0..k {
            assert_eq!(norm(r0[d] + r1[d]), mulm(s, v[d]));
        }
    }
}
