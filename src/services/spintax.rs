//! Spintax resolution: `{option1|option2}` groups collapse to one branch
//! chosen uniformly at random per occurrence. Pure text transform.

use rand::Rng;
use regex::Regex;
use std::sync::OnceLock;

static SPINTAX_RE: OnceLock<Regex> = OnceLock::new();

fn spintax_re() -> &'static Regex {
    SPINTAX_RE.get_or_init(|| Regex::new(r"\{[^{}]*\|[^{}]*\}").expect("valid regex"))
}

/// True when the text contains at least one pipe-delimited group.
/// `{{placeholder}}` tokens carry no pipe and never match.
pub fn has_spintax(text: &str) -> bool {
    spintax_re().is_match(text)
}

/// Resolve every spintax group with the thread-local RNG.
pub fn spin(text: &str) -> String {
    spin_with_rng(text, &mut rand::thread_rng())
}

/// Resolve every spintax group, drawing branches from `rng`.
pub fn spin_with_rng<R: Rng + ?Sized>(text: &str, rng: &mut R) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after_open = &rest[open..];
        match after_open.find('}') {
            Some(close_rel) => {
                let inner = &after_open[1..close_rel];
                if inner.contains('|') {
                    let options: Vec<&str> = inner.split('|').collect();
                    out.push_str(options[rng.gen_range(0..options.len())]);
                } else {
                    // Not a spintax group (e.g. a template token): keep verbatim.
                    out.push_str(&after_open[..=close_rel]);
                }
                rest = &after_open[close_rel + 1..];
            }
            None => {
                out.push_str(after_open);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_has_spintax() {
        assert!(has_spintax("Oi, {tudo bem|como vai}?"));
        assert!(!has_spintax("Oi, tudo bem?"));
        assert!(!has_spintax("Ola {{nome}}"));
    }

    #[test]
    fn test_spin_picks_one_branch() {
        let mut rng = StdRng::seed_from_u64(7);
        let result = spin_with_rng("{A|B|C}", &mut rng);
        assert!(["A", "B", "C"].contains(&result.as_str()));
    }

    #[test]
    fn test_spin_resolves_every_occurrence() {
        let mut rng = StdRng::seed_from_u64(42);
        let result = spin_with_rng("{Oi|Ola}, {tudo bem|como vai}?", &mut rng);
        assert!(!result.contains('{'));
        assert!(!result.contains('|'));
    }

    #[test]
    fn test_plain_text_unchanged() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(spin_with_rng("sem variacao", &mut rng), "sem variacao");
    }

    #[test]
    fn test_template_tokens_preserved() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(spin_with_rng("Ola {{nome}}!", &mut rng), "Ola {{nome}}!");
    }

    #[test]
    fn test_unbalanced_brace_kept_verbatim() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(spin_with_rng("abre {sem fechar", &mut rng), "abre {sem fechar");
    }

    #[test]
    fn test_all_branches_reachable() {
        // Over many draws every branch shows up at least once.
        let mut rng = StdRng::seed_from_u64(99);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            seen.insert(spin_with_rng("{A|B|C}", &mut rng));
        }
        assert_eq!(seen.len(), 3);
    }
}
