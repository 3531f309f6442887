//! Beaver multiplication triples: helper-side generation and the
//! reveal-and-combine arithmetic each party applies to consume them.
//!
//! A request for `k` triples returns `(a, b_i, c_i = a*b_i)` for
//! `i in 0..k` — all `k` triples share the same `a` component (see
//! [`crate::protocol`] for why that packing is exactly what the shared dot
//! product and scalar-vector product need). Each triple is split additively
//! between the two parties; the helper that generates them never learns a
//! party's data, only these correlated random triples.

use crate::field::{addm, mulm, subm, P};
use rand::Rng;

/// One party's half of a batch of `k` Beaver triples sharing one `a`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripleShare {
    /// This party's share of the shared `a`, broadcast to length `k`.
    pub a: Vec<i64>,
    /// This party's share of each `b_i`.
    pub b: Vec<i64>,
    /// This party's share of each `c_i = a*b_i`.
    pub c: Vec<i64>,
}

impl TripleShare {
    /// Number of triples in the batch.
    pub fn len(&self) -> usize {
        self.a.len()
    }

    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.a.is_empty()
    }

    /// Pack as `(a, b_0, c_0, a, b_1, c_1, ...)`, the wire layout §4.4/§6
    /// specifies for the helper's reply.
    pub fn to_wire(&self) -> Vec<i64> {
        let mut out = Vec::with_capacity(self.len() * 3);
        for i in 0..self.len() {
            out.push(self.a[i]);
            out.push(self.b[i]);
            out.push(self.c[i]);
        }
        out
    }

    /// Unpack the `(a, b, c)`-interleaved wire layout back into a batch.
    pub fn from_wire(words: &[i64]) -> crate::error::Result<TripleShare> {
        if words.len() % 3 != 0 {
            return Err(crate::error::Error::MalformedInput {
                context: format!(
                    "Beaver triple wire payload length {} is not a multiple of 3",
                    words.len()
                ),
            });
        }
        let k = words.len() / 3;
        let mut a = Vec::with_capacity(k);
        let mut b = Vec::with_capacity(k);
        let mut c = Vec::with_capacity(k);
        for chunk in words.chunks_exact(3) {
            a.push(chunk[0]);
            b.push(chunk[1]);
            c.push(chunk[2]);
        }
        Ok(TripleShare { a, b, c })
    }
}

/// Generate a batch of `k` Beaver triples sharing a single `a`, split
/// additively between the two parties. Run only by the helper.
pub fn generate_triples<R: Rng>(k: usize, rng: &mut R) -> (TripleShare, TripleShare) {
    let a: i64 = rng.gen_range(0..P);
    let a0: i64 = rng.gen_range(0..P);
    let a1 = subm(a, a0);

    let mut b0 = Vec::with_capacity(k);
    let mut b1 = Vec::with_capacity(k);
    let mut c0 = Vec::with_capacity(k);
    let mut c1 = Vec::with_capacity(k);

    for _ in 0..k {
        let b: i64 = rng.gen_range(0..P);
        let c = mulm(a, b);

        let bsh: i64 = rng.gen_range(0..P);
        let csh: i64 = rng.gen_range(0..P);

        b0.push(bsh);
        b1.push(subm(b, bsh));
        c0.push(csh);
        c1.push(subm(c, csh));
    }

    (
        TripleShare {
            a: vec![a0; k],
            b: b0,
            c: c0,
        },
        TripleShare {
            a: vec![a1; k],
            b: b1,
            c: c1,
        },
    )
}

/// Combine a revealed mask pair `(alpha, beta)` — already summed across both
/// parties — with this party's triple share and its share of `y` to recover
/// this party's share of `<x, y>` (or, for the scalar-vector case, `s * v`):
///
/// `z_b = Σ_i (alpha_i · y_b,i − beta_i · a_b,i + c_b,i) mod p`.
///
/// No cross term is needed: `alpha`/`beta` are public reconstructed masks,
/// not the raw differences `x - a`/`y - b`, so the identity sums cleanly
/// across both parties without assigning a `d*e` term to either one.
pub fn combine_share(triple: &TripleShare, alpha: &[i64], beta: &[i64], y_share: &[i64]) -> i64 {
    debug_assert_eq!(triple.len(), alpha.len());
    debug_assert_eq!(triple.len(), beta.len());
    debug_assert_eq!(triple.len(), y_share.len());

    let mut z = 0i64;
    for i in 0..triple.len() {
        z = addm(z, mulm(alpha[i], y_share[i]));
        z = subm(z, mulm(beta[i], triple.a[i]));
        z = addm(z, triple.c[i]);
    }
    z
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::norm;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn triples_share_one_a_and_multiply_correctly() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let (t0, t1) = generate_triples(4, &mut rng);
        for i in 0..4 {
            let a = addm(t0.a[i], t1.a[i]);
            let b = addm(t0.b[i], t1.b[i]);
            let c = addm(t0.c[i], t1.c[i]);
            assert_eq!(c, mulm(a, b));
        }
        // the `a` component is identical across all i within each party's share
        assert!(t0.a.iter().all(|&x| x == t0.a[0]));
        assert!(t1.a.iter().all(|&x| x == t1.a[0]));
    }

    #[test]
    fn combine_share_recovers_dot_product() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let k = 3;
        let (t0, t1) = generate_triples(k, &mut rng);

        let x = vec![2i64, 3, 5];
        let y = vec![7i64, 11, 13];
        let x0 = vec![1i64, 1, 1];
        let x1: Vec<i64> = x.iter().zip(&x0).map(|(&a, &b)| subm(a, b)).collect();
        let y0 = vec![2i64, 2, 2];
        let y1: Vec<i64> = y.iter().zip(&y0).map(|(&a, &b)| subm(a, b)).collect();

        let alpha: Vec<i64> = (0..k)
            .map(|i| addm(addm(x0[i], t0.a[i]), addm(x1[i], t1.a[i])))
            .collect();
        let beta: Vec<i64> = (0..k)
            .map(|i| addm(addm(y0[i], t0.b[i]), addm(y1[i], t1.b[i])))
            .collect();

        let z0 = combine_share(&t0, &alpha, &beta, &y0);
        let z1 = combine_share(&t1, &alpha, &beta, &y1);

        let expected = x.iter().zip(&y).fold(0i64, |acc, (&a, &b)| addm(acc, mulm(a, b)));
        assert_eq!(norm(z0 + z1), expected);
    }

    #[test]
    fn wire_roundtrip() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let (t0, _t1) = generate_triples(5, &mut rng);
        let wire = t0.to_wire();
        let back = TripleShare::from_wire(&wire).unwrap();
        assert_eq!(t0, back);
    }
}
