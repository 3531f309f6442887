//! Helper (P2) binary: serves Beaver triples to P0 and P1 (§4.4, §4.7).

use anyhow::{Context, Result};
use mpc_reco::beaver::generate_triples;
use mpc_reco::channel::{accept_helper_clients, Channel};
use rand::thread_rng;

fn serve_request(ch0: &mut Channel, ch1: &mut Channel) -> Result<bool> {
    let k = ch0
        .read_i64()
        .with_context(|| "reading triple request count from P0")?;
    if k <= 0 {
        return Ok(false);
    }
    let k = k as usize;

    let mut rng = thread_rng();
    let (t0, t1) = generate_triples(k, &mut rng);

    ch0.write_i64_array(&t0.to_wire())
        .with_context(|| "writing triples to P0")?;
    ch0.flush()?;
    ch1.write_i64_array(&t1.to_wire())
        .with_context(|| "writing triples to P1")?;
    ch1.flush()?;

    Ok(true)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let span = tracing::info_span!("role", id = "helper");
    let _enter = span.enter();

    tracing::info!("waiting for P0 and P1 to connect");
    let ((role_a, chan_a), (_role_b, chan_b)) =
        accept_helper_clients().with_context(|| "accepting party connections")?;

    let (mut p0, mut p1) = if role_a == 0 {
        (chan_a, chan_b)
    } else {
        (chan_b, chan_a)
    };

    tracing::info!("serving triples");
    loop {
        let keep_going = serve_request(&mut p0, &mut p1)?;
        if !keep_going {
            break;
        }
    }

    tracing::info!("helper shutting down");
    Ok(())
}
