//! Modular field arithmetic over F_p with p = 10^9 + 7, and additive
//! share vectors over that field.
//!
//! All arithmetic normalizes into `[0, P)`. Multiplication widens to `i128`
//! before reducing, so no product ever overflows regardless of how the two
//! `i64` operands were produced.

use crate::error::Error;
use rand::Rng;
use std::io::Write;
use std::ops::{Add, Sub};

/// The field modulus, 10^9 + 7.
pub const P: i64 = 1_000_000_007;

/// The multiplicative inverse of 2 mod [`P`], used to halve the combined
/// sign-share during DPF-based scatter (`p` is odd, so `(p+1)/2` works).
pub const INV2: i64 = (P + 1) / 2;

/// Normalize `x` into `[0, P)`.
#[inline]
pub fn norm(x: i64) -> i64 {
    let mut r = x % P;
    if r < 0 {
        r += P;
    }
    r
}

/// `(a + b) mod P`.
#[inline]
pub fn addm(a: i64, b: i64) -> i64 {
    norm(a + b)
}

/// `(a - b) mod P`.
#[inline]
pub fn subm(a: i64, b: i64) -> i64 {
    norm(a - b)
}

/// `(a * b) mod P`, via a 128-bit intermediate product.
#[inline]
pub fn mulm(a: i64, b: i64) -> i64 {
    let prod = (a as i128) * (b as i128);
    (prod.rem_euclid(P as i128)) as i64
}

/// An additive share vector of `k` field elements.
///
/// Two shares `(x0, x1)` with `x0 + x1 ≡ x (mod P)` componentwise represent
/// the secret `x ∈ F_p^k`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Share {
    data: Vec<i64>,
}

impl Share {
    /// A zero share of the given length.
    pub fn zeros(len: usize) -> Self {
        Self {
            data: vec![0; len],
        }
    }

    /// Wrap a vector of already-normalized field elements.
    pub fn from_vec(data: Vec<i64>) -> Self {
        Self { data }
    }

    /// Fill with independent uniform field elements drawn from `rng`.
    pub fn randomize<R: Rng>(len: usize, rng: &mut R) -> Self {
        let data = (0..len).map(|_| rng.gen_range(0..P)).collect();
        Self { data }
    }

    /// Number of field elements in the share.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the share is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrow the underlying slice.
    pub fn as_slice(&self) -> &[i64] {
        &self.data
    }

    /// Borrow the underlying slice mutably.
    pub fn as_mut_slice(&mut self) -> &mut [i64] {
        &mut self.data
    }

    fn check_len(&self, other: &Share) -> crate::error::Result<()> {
        if self.data.len() != other.data.len() {
            return Err(Error::ShapeMismatch {
                expected: self.data.len(),
                got: other.data.len(),
            });
        }
        Ok(())
    }

    /// Componentwise field addition, failing on a length mismatch.
    pub fn add(&self, other: &Share) -> crate::error::Result<Share> {
        self.check_len(other)?;
        Ok(Share {
            data: self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(&a, &b)| addm(a, b))
                .collect(),
        })
    }

    /// Componentwise field subtraction, failing on a length mismatch.
    pub fn sub(&self, other: &Share) -> crate::error::Result<Share> {
        self.check_len(other)?;
        Ok(Share {
            data: self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(&a, &b)| subm(a, b))
                .collect(),
        })
    }

    /// Subtract a scalar from every component (used when broadcasting
    /// `final_cw` across k dimensions in item-side scatter).
    pub fn sub_scalar_broadcast(&self, scalar: i64) -> Share {
        Share {
            data: self.data.iter().map(|&a| subm(a, scalar)).collect(),
        }
    }

    /// Add `coeff * other[d]` to every component `d` in place.
    pub fn add_scaled_in_place(&mut self, coeff: i64, other: &Share) -> crate::error::Result<()> {
        self.check_len(other)?;
        for (a, &b) in self.data.iter_mut().zip(other.data.iter()) {
            *a = addm(*a, mulm(coeff, b));
        }
        Ok(())
    }

    /// The plain (insecure) inner product, used only by the direct-replay
    /// verifier to recompute ground truth from reconstructed plaintext.
    pub fn dot_plain(&self, other: &Share) -> crate::error::Result<i64> {
        self.check_len(other)?;
        Ok(self
            .data
            .iter()
            .zip(other.data.iter())
            .fold(0i64, |acc, (&a, &b)| addm(acc, mulm(a, b))))
    }

    /// Serialize as a row of whitespace-separated decimals, without a
    /// trailing newline.
    pub fn write_row<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        for (i, v) in self.data.iter().enumerate() {
            if i > 0 {
                write!(w, " ")?;
            }
            write!(w, "{v}")?;
        }
        Ok(())
    }

    /// Parse a whitespace-separated row, rejecting a width that does not
    /// match `expected_len` with a [`Error::MalformedInput`].
    pub fn parse_row(line: &str, expected_len: usize) -> crate::error::Result<Share> {
        let data = line
            .split_whitespace()
            .map(|tok| {
                tok.parse::<i64>().map_err(|e| Error::MalformedInput {
                    context: format!("invalid field element {tok:?}: {e}"),
                })
            })
            .collect::<crate::error::Result<Vec<i64>>>()?;

        if data.len() != expected_len {
            return Err(Error::ShapeMismatch {
                expected: expected_len,
                got: data.len(),
            });
        }

        Ok(Share { data })
    }
}

impl Add for &Share {
    type Output = Share;
    fn add(self, rhs: &Share) -> Share {
        Share::add(self, rhs).expect("Share addition requires matching lengths")
    }
}

impl Sub for &Share {
    type Output = Share;
    fn sub(self, rhs: &Share) -> Share {
        Share::sub(self, rhs).expect("Share subtraction requires matching lengths")
    }
}
