//! Deterministic program fingerprinting derived from the explain
//! projection.

use super::explain::ExplainProgram;
use sha2::{Digest, Sha256};
use std::fmt;

///
/// ProgramFingerprint
///
/// Stable, deterministic fingerprint for compiled programs. Inputs are
/// the explain projection, so equivalent programs fingerprint equally.
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ProgramFingerprint([u8; 32]);

impl ProgramFingerprint {
    #[must_use]
    pub fn as_hex(&self) -> String {
        let mut out = String::with_capacity(64);
        for byte in self.0 {
            use std::fmt::Write as _;
            let _ = write!(out, "{byte:02x}");
        }
        out
    }
}

impl fmt::Display for ProgramFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_hex())
    }
}

pub(super) fn fingerprint(explain: &ExplainProgram) -> ProgramFingerprint {
    let mut hasher = Sha256::new();
    hasher.update(b"progfp:v1");

    write_tag(&mut hasher, 0x01);
    write_u32(&mut hasher, u32::try_from(explain.steps.len()).unwrap_or(u32::MAX));
    for step in &explain.steps {
        write_str(&mut hasher, step);
    }

    write_tag(&mut hasher, 0x02);
    write_u32(&mut hasher, u32::try_from(explain.groups.len()).unwrap_or(u32::MAX));
    for (id, group) in &explain.groups {
        write_u32(&mut hasher, *id);
        write_u32(&mut hasher, group.depth_limit);
        write_str(&mut hasher, &group.on_overflow);
        match &group.stop {
            Some(stop) => {
                write_tag(&mut hasher, 0x01);
                write_str(&mut hasher, stop);
            }
            None => write_tag(&mut hasher, 0x00),
        }
        write_u32(&mut hasher, u32::try_from(group.steps.len()).unwrap_or(u32::MAX));
        for step in &group.steps {
            write_str(&mut hasher, step);
        }
    }

    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    ProgramFingerprint(out)
}

fn write_tag(hasher: &mut Sha256, tag: u8) {
    hasher.update([tag]);
}

fn write_u32(hasher: &mut Sha256, value: u32) {
    hasher.update(value.to_be_bytes());
}

fn write_str(hasher: &mut Sha256, value: &str) {
    write_u32(hasher, u32::try_from(value.len()).unwrap_or(u32::MAX));
    hasher.update(value.as_bytes());
}
