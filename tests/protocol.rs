//! End-to-end coverage of the full query tape: dealer output fed through a
//! loopback helper and a loopback pair of parties, checked against the
//! same direct-replay ground truth the verifier binary computes.

use mpc_reco::beaver::generate_triples;
use mpc_reco::channel::Channel;
use mpc_reco::dealer::run_dealer;
use mpc_reco::dpf::DpfKey;
use mpc_reco::field::{mulm, subm, Share};
use mpc_reco::protocol::{item_scatter, oblivious_select, user_finalize, user_update_share};
use rand::{thread_rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
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

/// Stand in for the helper binary: read the triple count from P0's socket
/// only, generate one batch, and push it to both sockets.
fn spawn_helper(mut ch0: Channel, mut ch1: Channel) {
    std::thread::spawn(move || loop {
        let k = match ch0.read_i64() {
            Ok(v) => v,
            Err(_) => return,
        };
        if k <= 0 {
            return;
        }
        let k = k as usize;
        let mut rng = thread_rng();
        let (t0, t1) = generate_triples(k, &mut rng);
        if ch0.write_i64_array(&t0.to_wire()).is_err() || ch0.flush().is_err() {
            return;
        }
        if ch1.write_i64_array(&t1.to_wire()).is_err() || ch1.flush().is_err() {
            return;
        }
    });
}

#[allow(clippy::too_many_arguments)]
fn run_party(
    role: u8,
    mut peer: Channel,
    mut helper: Channel,
    mut u_shares: Vec<Share>,
    mut v_shares: Vec<Share>,
    query_users: &[u64],
    dpf_keys: &[DpfKey],
    negate_bits: &[bool],
    n: u64,
    k: usize,
) -> (Vec<Share>, BTreeMap<u64, Share>) {
    let mut rng = ChaCha8Rng::seed_from_u64(if role == 0 { 100 } else { 200 });
    let mut reconstructed_results = BTreeMap::new();

    for (q, &user_idx) in query_users.iter().enumerate() {
        let dpf_key = &dpf_keys[q];
        // DPF_NEG.txt carries P0's negate bit; P1 applies the complement.
        let negate = if role == 0 { negate_bits[q] } else { !negate_bits[q] };

        let v_sel_b = oblivious_select(role, &mut peer, &mut helper, dpf_key, negate, &v_shares, n, k)
            .unwrap();
        let u_i_b = u_shares[user_idx as usize].as_slice().to_vec();

        let (delta_b, m_b) =
            user_update_share(&mut peer, &mut helper, role, &u_i_b, &v_sel_b).unwrap();

        item_scatter(&mut peer, dpf_key, negate, dpf_key.final_cw, &m_b, &mut v_shares, n).unwrap();

        let (new_u_b, u_i_prime) =
            user_finalize(&mut peer, &mut helper, role, &u_i_b, delta_b, &v_sel_b, &mut rng)
                .unwrap();

        u_shares[user_idx as usize] = Share::from_vec(new_u_b);
        reconstructed_results.insert(user_idx, Share::from_vec(u_i_prime));
    }

    if role == 0 {
        helper.write_i64(0).unwrap();
        helper.flush().unwrap();

        peer.write_i64(-1).unwrap();
        peer.flush().unwrap();
        let mut v_final = Vec::with_capacity(v_shares.len());
        for row in &v_shares {
            let peer_row = peer.read_i64_array(k).unwrap();
            let reconstructed: Vec<i64> = row
                .as_slice()
                .iter()
                .zip(&peer_row)
                .map(|(&a, &b)| mpc_reco::field::addm(a, b))
                .collect();
            v_final.push(Share::from_vec(reconstructed));
        }
        (v_final, reconstructed_results)
    } else {
        let sentinel = peer.read_i64().unwrap();
        assert_eq!(sentinel, -1);
        for row in &v_shares {
            peer.write_i64_array(row.as_slice()).unwrap();
        }
        peer.flush().unwrap();
        (Vec::new(), reconstructed_results)
    }
}

/// Plaintext replay identical to the verifier binary's ground truth.
fn replay(u: &mut [Share], v: &mut [Share], queries: &[(u64, u64)]) {
    for &(user, item) in queries {
        let u_i = u[user as usize].clone();
        let v_j = v[item as usize].clone();
        let prod = u_i.dot_plain(&v_j).unwrap();
        let delta = subm(1, prod);

        let m: Vec<i64> = u_i.as_slice().iter().map(|&x| mulm(delta, x)).collect();
        v[item as usize] = v[item as usize].add(&Share::from_vec(m)).unwrap();

        let term: Vec<i64> = v_j.as_slice().iter().map(|&x| mulm(delta, x)).collect();
        u[user as usize] = u_i.add(&Share::from_vec(term)).unwrap();
    }
}

fn reconstruct(a: &[Share], b: &[Share]) -> Vec<Share> {
    a.iter().zip(b).map(|(x, y)| x.add(y).unwrap()).collect()
}

fn run_scenario(m: usize, n: usize, k: usize, num_queries: usize, dealer_seed: u64) {
    let mut dealer_rng = ChaCha8Rng::seed_from_u64(dealer_seed);
    let out = run_dealer(m, n, k, num_queries, &mut dealer_rng).unwrap();

    let (peer0, peer1) = loopback_pair();
    let (helper_srv0, helper_cli0) = loopback_pair();
    let (helper_srv1, helper_cli1) = loopback_pair();
    spawn_helper(helper_srv0, helper_srv1);

    let n_u64 = n as u64;
    let query_users0 = out.queries_users.clone();
    let query_users1 = out.queries_users.clone();
    let dpf0 = out.dpf0.clone();
    let dpf1 = out.dpf1.clone();
    let negate0 = out.negate.clone();
    let negate1 = out.negate.clone();
    let u0 = out.u0.clone();
    let u1 = out.u1.clone();
    let v0 = out.v0.clone();
    let v1 = out.v1.clone();

    let h0 = std::thread::spawn(move || {
        run_party(0, peer0, helper_cli0, u0, v0, &query_users0, &dpf0, &negate0, n_u64, k)
    });
    let h1 = std::thread::spawn(move || {
        run_party(1, peer1, helper_cli1, u1, v1, &query_users1, &dpf1, &negate1, n_u64, k)
    });

    let (v_final, results0) = h0.join().unwrap();
    let (_, results1) = h1.join().unwrap();

    assert_eq!(results0.keys().collect::<Vec<_>>(), results1.keys().collect::<Vec<_>>());

    let mut u_plain = reconstruct(&out.u0, &out.u1);
    let mut v_plain = reconstruct(&out.v0, &out.v1);
    replay(&mut u_plain, &mut v_plain, &out.queries);

    for (&user_idx, reconstructed) in &results0 {
        assert_eq!(reconstructed, &results1[&user_idx]);
        assert_eq!(reconstructed, &u_plain[user_idx as usize]);
    }

    for (idx, row) in v_final.iter().enumerate() {
        assert_eq!(row, &v_plain[idx]);
    }
}

#[test]
fn single_query_matches_plaintext_update() {
    run_scenario(2, 2, 2, 1, 1);
}

#[test]
fn two_back_to_back_queries_matches_plaintext_update() {
    run_scenario(3, 4, 3, 2, 2);
}

#[test]
fn repeated_item_queries_accumulate_correctly() {
    run_scenario(2, 2, 2, 5, 3);
}

#[test]
fn larger_domain_matches_plaintext_update() {
    run_scenario(4, 9, 2, 4, 4);
}
