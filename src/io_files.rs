//! Text file formats shared by the dealer, party, and verifier binaries
//! (§6): U/V share matrices, query tapes, DPF key files, the negate-hint
//! file, and the two result files the protocol emits on completion.

use crate::dpf::DpfKey;
use crate::error::{Error, Result};
use crate::field::Share;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// Read a matrix file: one row per line, `k` space-separated decimals.
pub fn read_matrix(path: impl AsRef<Path>, k: usize) -> Result<Vec<Share>> {
    let file = File::open(path).map_err(Error::Io)?;
    BufReader::new(file)
        .lines()
        .map(|line| Share::parse_row(&line.map_err(Error::Io)?, k))
        .collect()
}

/// Write a matrix file, one row per line.
pub fn write_matrix(path: impl AsRef<Path>, rows: &[Share]) -> Result<()> {
    let mut file = File::create(path).map_err(Error::Io)?;
    for row in rows {
        row.write_row(&mut file).map_err(Error::Io)?;
        writeln!(file).map_err(Error::Io)?;
    }
    Ok(())
}

/// Read `queries_users.txt`: one decimal user index per line.
pub fn read_user_queries(path: impl AsRef<Path>) -> Result<Vec<u64>> {
    let file = File::open(path).map_err(Error::Io)?;
    BufReader::new(file)
        .lines()
        .map(|line| {
            let line = line.map_err(Error::Io)?;
            line.trim().parse::<u64>().map_err(|e| Error::MalformedInput {
                context: format!("invalid user index {line:?}: {e}"),
            })
        })
        .collect()
}

/// Write `queries_users.txt`.
pub fn write_user_queries(path: impl AsRef<Path>, users: &[u64]) -> Result<()> {
    let mut file = File::create(path).map_err(Error::Io)?;
    for u in users {
        writeln!(file, "{u}").map_err(Error::Io)?;
    }
    Ok(())
}

/// Read `queries.txt`: direct-replay ground truth, `user_idx item_idx` pairs.
pub fn read_ground_truth_queries(path: impl AsRef<Path>) -> Result<Vec<(u64, u64)>> {
    let file = File::open(path).map_err(Error::Io)?;
    BufReader::new(file)
        .lines()
        .map(|line| {
            let line = line.map_err(Error::Io)?;
            let mut toks = line.split_whitespace();
            let parse = |tok: Option<&str>| {
                tok.and_then(|t| t.parse::<u64>().ok())
                    .ok_or_else(|| Error::MalformedInput {
                        context: format!("malformed query line {line:?}"),
                    })
            };
            let user = parse(toks.next())?;
            let item = parse(toks.next())?;
            Ok((user, item))
        })
        .collect()
}

/// Write `queries.txt`.
pub fn write_ground_truth_queries(path: impl AsRef<Path>, queries: &[(u64, u64)]) -> Result<()> {
    let mut file = File::create(path).map_err(Error::Io)?;
    for (user, item) in queries {
        writeln!(file, "{user} {item}").map_err(Error::Io)?;
    }
    Ok(())
}

/// Read a DPF key file (`DPF0.txt`/`DPF1.txt`): one key per line.
pub fn read_dpf_keys(path: impl AsRef<Path>) -> Result<Vec<DpfKey>> {
    let file = File::open(path).map_err(Error::Io)?;
    BufReader::new(file)
        .lines()
        .map(|line| DpfKey::parse_line(&line.map_err(Error::Io)?))
        .collect()
}

/// Write a DPF key file.
pub fn write_dpf_keys(path: impl AsRef<Path>, keys: &[DpfKey]) -> Result<()> {
    let mut file = File::create(path).map_err(Error::Io)?;
    for key in keys {
        writeln!(file, "{}", key.write_line()).map_err(Error::Io)?;
    }
    Ok(())
}

/// Read `DPF_NEG.txt`: one `negate_p0` bit per line.
pub fn read_negate_bits(path: impl AsRef<Path>) -> Result<Vec<bool>> {
    let file = File::open(path).map_err(Error::Io)?;
    BufReader::new(file)
        .lines()
        .map(|line| {
            let line = line.map_err(Error::Io)?;
            match line.trim() {
                "0" => Ok(false),
                "1" => Ok(true),
                other => Err(Error::MalformedInput {
                    context: format!("negate bit must be 0 or 1, got {other:?}"),
                }),
            }
        })
        .collect()
}

/// Write `DPF_NEG.txt`.
pub fn write_negate_bits(path: impl AsRef<Path>, bits: &[bool]) -> Result<()> {
    let mut file = File::create(path).map_err(Error::Io)?;
    for &b in bits {
        writeln!(file, "{}", b as u8).map_err(Error::Io)?;
    }
    Ok(())
}

/// Write `mpc_results.txt` / `mpc_V_results.txt`: `idx v0 v1 ... v_{k-1}`.
pub fn write_indexed_rows(path: impl AsRef<Path>, rows: &[(u64, Share)]) -> Result<()> {
    let mut file = File::create(path).map_err(Error::Io)?;
    for (idx, row) in rows {
        write!(file, "{idx} ").map_err(Error::Io)?;
        row.write_row(&mut file).map_err(Error::Io)?;
        writeln!(file).map_err(Error::Io)?;
    }
    Ok(())
}

/// Read a results file written by [`write_indexed_rows`].
pub fn read_indexed_rows(path: impl AsRef<Path>, k: usize) -> Result<Vec<(u64, Share)>> {
    let file = File::open(path).map_err(Error::Io)?;
    BufReader::new(file)
        .lines()
        .map(|line| {
            let line = line.map_err(Error::Io)?;
            let mut toks = line.splitn(2, ' ');
            let idx = toks
                .next()
                .and_then(|t| t.parse::<u64>().ok())
                .ok_or_else(|| Error::MalformedInput {
                    context: format!("missing row index in {line:?}"),
                })?;
            let rest = toks.next().unwrap_or("");
            let row = Share::parse_row(rest, k)?;
            Ok((idx, row))
        })
        .collect()
}

/// Touch the `mpc_results.done` completion flag file; written last.
pub fn write_done_flag(path: impl AsRef<Path>) -> Result<()> {
    File::create(path).map_err(Error::Io)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn matrix_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("U0.txt");
        let rows = vec![Share::from_vec(vec![1, 2, 3]), Share::from_vec(vec![4, 5, 6])];
        write_matrix(&path, &rows).unwrap();
        let back = read_matrix(&path, 3).unwrap();
        assert_eq!(rows, back);
    }

    #[test]
    fn user_queries_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queries_users.txt");
        write_user_queries(&path, &[0, 1, 1, 0]).unwrap();
        assert_eq!(read_user_queries(&path).unwrap(), vec![0, 1, 1, 0]);
    }

    #[test]
    fn ground_truth_queries_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queries.txt");
        write_ground_truth_queries(&path, &[(0, 2), (1, 3)]).unwrap();
        assert_eq!(
            read_ground_truth_queries(&path).unwrap(),
            vec![(0, 2), (1, 3)]
        );
    }

    #[test]
    fn negate_bits_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("DPF_NEG.txt");
        write_negate_bits(&path, &[true, false, true]).unwrap();
        assert_eq!(read_negate_bits(&path).unwrap(), vec![true, false, true]);
    }

    #[test]
    fn indexed_rows_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mpc_results.txt");
        let rows = vec![(0u64, Share::from_vec(vec![1, 2])), (3u64, Share::from_vec(vec![3, 4]))];
        write_indexed_rows(&path, &rows).unwrap();
        assert_eq!(read_indexed_rows(&path, 2).unwrap(), rows);
    }

    #[test]
    fn done_flag_is_created() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mpc_results.done");
        assert!(!path.exists());
        write_done_flag(&path).unwrap();
        assert!(path.exists());
    }
}
