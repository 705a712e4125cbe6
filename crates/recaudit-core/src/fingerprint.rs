use sha2::{Digest, Sha256};

use crate::model::{PlayerMode, WatchTime};

#[derive(Debug, Clone)]
pub struct Fingerprint {
    pub hex: String,
    pub components: Vec<String>,
}

pub fn sha256_hex(s: &str) -> String {
    let mut h = Sha256::new();
    h.update(s.as_bytes());
    hex::encode(h.finalize())
}

/// Identity of one task execution for incremental skip.
pub struct Context<'a> {
    pub experiment: &'a str,
    pub task_id: &'a str,
    pub mode: PlayerMode,
    pub seed_ids: &'a [String],
    pub hops: u32,
    pub watch_time: WatchTime,
}

/// Computes a deterministic fingerprint for a task execution context.
///
/// Any change to the inputs that could change the collected data must land
/// in a component here, including the crate version (collection logic may
/// change between releases).
#[must_use]
pub fn compute(ctx: Context<'_>) -> Fingerprint {
    let mut parts = Vec::new();

    parts.push(format!("experiment={}", ctx.experiment));
    parts.push(format!("task_id={}", ctx.task_id));
    parts.push(format!("mode={}", ctx.mode));
    parts.push(format!("seeds={}", ctx.seed_ids.join(",")));
    parts.push(format!("hops={}", ctx.hops));
    let wt = match ctx.watch_time {
        WatchTime::Seconds(s) => format!("{s}s"),
        WatchTime::Fraction(f) => format!("{f}x"),
    };
    parts.push(format!("watch_time={wt}"));
    parts.push(format!("recaudit_version={}", env!("CARGO_PKG_VERSION")));

    let raw = parts.join("\n");
    let hex = sha256_hex(&raw);

    Fingerprint {
        hex,
        components: parts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(seeds: &'a [String], hops: u32) -> Context<'a> {
        Context {
            experiment: "exp",
            task_id: "task_0000",
            mode: PlayerMode::Long,
            seed_ids: seeds,
            hops,
            watch_time: WatchTime::Seconds(10),
        }
    }

    #[test]
    fn identical_contexts_hash_identically() {
        let seeds = vec!["a".to_string(), "b".to_string()];
        let a = compute(ctx(&seeds, 15));
        let b = compute(ctx(&seeds, 15));
        assert_eq!(a.hex, b.hex);
        assert_eq!(a.hex.len(), 64);
    }

    #[test]
    fn any_component_change_changes_the_hash() {
        let seeds = vec!["a".to_string()];
        let base = compute(ctx(&seeds, 15)).hex;
        assert_ne!(base, compute(ctx(&seeds, 16)).hex);

        let other = vec!["b".to_string()];
        assert_ne!(base, compute(ctx(&other, 15)).hex);

        let mut c = ctx(&seeds, 15);
        c.watch_time = WatchTime::Fraction(0.5);
        assert_ne!(base, compute(c).hex);
    }
}
