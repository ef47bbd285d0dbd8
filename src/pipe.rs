//! Line-oriented packet pipe behind the `protect` and `unprotect` commands.
//!
//! Each input line holds one base64 packet. RTP and RTCP share the stream and
//! are told apart by payload type unless the caller forces RTCP.

use std::io::{BufRead, Write};

use anyhow::{Context as _, Result};
use base64::Engine;

use crate::media::rtcp::is_rtcp_packet;
use crate::media::srtp::Context;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Protect,
    Unprotect,
}

/// Outcome counts for one run of [`run`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipeStats {
    pub processed: usize,
    pub dropped: usize,
}

/// Protect or unprotect one packet, writing the result into `scratch`.
pub fn transform(
    context: &Context,
    direction: Direction,
    force_rtcp: bool,
    packet: &[u8],
    scratch: Vec<u8>,
) -> crate::media::srtp::Result<Vec<u8>> {
    let rtcp = force_rtcp || is_rtcp_packet(packet);
    match (direction, rtcp) {
        (Direction::Protect, false) => context.encrypt_rtp(scratch, packet),
        (Direction::Protect, true) => context.encrypt_rtcp(scratch, packet),
        (Direction::Unprotect, false) => context.decrypt_rtp(scratch, packet),
        (Direction::Unprotect, true) => context.decrypt_rtcp(scratch, packet),
    }
}

/// Read base64 packets from `input`, write transformed base64 packets to
/// `output`. Packets that fail are logged and skipped.
pub fn run<R: BufRead, W: Write>(
    context: &Context,
    direction: Direction,
    force_rtcp: bool,
    input: R,
    mut output: W,
) -> Result<PipeStats> {
    let engine = base64::engine::general_purpose::STANDARD;
    let mut stats = PipeStats::default();
    let mut scratch = Vec::new();

    for (line_no, line) in input.lines().enumerate() {
        let line = line.context("Failed to read input")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let packet = match engine.decode(line) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::warn!("line {}: invalid base64: {}", line_no + 1, e);
                stats.dropped += 1;
                continue;
            }
        };

        match transform(context, direction, force_rtcp, &packet, std::mem::take(&mut scratch)) {
            Ok(out) => {
                writeln!(output, "{}", engine.encode(&out)).context("Failed to write output")?;
                scratch = out;
                stats.processed += 1;
            }
            Err(e) => {
                tracing::warn!("line {}: dropped packet: {}", line_no + 1, e);
                stats.dropped += 1;
            }
        }
    }

    output.flush().context("Failed to flush output")?;
    Ok(stats)
}
