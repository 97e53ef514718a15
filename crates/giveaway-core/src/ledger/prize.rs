// Prize text parsing, formatting, and the two-list prize pool.
//
// Prize strings are free text typed by the streamer, e.g.
// `"Skin Pack (donated by Bob) (x3)"`. A trailing quantity token sets how
// many units the string represents; a trailing parenthesised group that is
// not a quantity token names the donator.

use std::sync::OnceLock;

use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;

const DONATOR_PREFIXES: &[&str] = &["donated by", "sponsored by", "courtesy of", "from"];

fn quantity_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\([xX]\s*(\d+)\)|\[[xX]\s*(\d+)\]").expect("quantity pattern is valid")
    })
}

fn donator_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:\(([^()]+)\)|\[([^\[\]]+)\])\s*$").expect("donator pattern is valid")
    })
}

// ---------------------------------------------------------------------------
// Prize
// ---------------------------------------------------------------------------

/// A parsed prize description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prize {
    pub name: String,
    pub donator: Option<String>,
    pub quantity: u32,
}

impl Prize {
    /// The text shown to chat and used to deduplicate prize types:
    /// the name, followed by the donator in parentheses when present.
    pub fn display_key(&self) -> String {
        match &self.donator {
            Some(d) => format!("{} ({})", self.name, d),
            None => self.name.clone(),
        }
    }
}

/// Parse free prize text. Never fails: text that yields an empty name comes
/// back whole as the name, with no donator and a quantity of 1.
pub fn parse_prize(text: &str) -> Prize {
    let full = text.trim();
    let fallback = || Prize {
        name: full.to_string(),
        donator: None,
        quantity: 1,
    };

    let mut rest = full.to_string();
    let mut quantity = 1u32;
    if let Some(caps) = quantity_re().captures_iter(full).last() {
        let digits = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str());
        quantity = digits
            .and_then(|d| d.parse::<u32>().ok())
            .unwrap_or(1)
            .max(1);
        if let Some(m) = caps.get(0) {
            rest = format!("{}{}", &full[..m.start()], &full[m.end()..]);
        }
    }
    let rest = rest.trim();

    let mut donator = None;
    let mut name = rest;
    if let Some(caps) = donator_re()
        .captures(rest)
        .filter(|c| !c.get(0).is_some_and(|m| quantity_re().is_match(m.as_str())))
    {
        let inner = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().trim())
            .unwrap_or_default();
        donator = strip_donator_prefix(inner);
        if let Some(m) = caps.get(0) {
            name = rest[..m.start()].trim();
        }
    }

    if name.is_empty() {
        return fallback();
    }

    Prize {
        name: name.to_string(),
        donator,
        quantity,
    }
}

fn strip_donator_prefix(inner: &str) -> Option<String> {
    let stripped = DONATOR_PREFIXES
        .iter()
        .find_map(|p| {
            let head = inner.get(..p.len())?;
            let tail = &inner[p.len()..];
            let at_word_end = tail.is_empty() || tail.starts_with(char::is_whitespace);
            (head.eq_ignore_ascii_case(p) && at_word_end).then(|| tail.trim())
        })
        .unwrap_or(inner);
    if stripped.is_empty() {
        None
    } else {
        Some(stripped.to_string())
    }
}

/// Canonical text for a prize: `Name (Donator) (xN)`. The donator and the
/// quantity token are omitted when absent or 1.
pub fn format_prize(prize: &Prize) -> String {
    let mut out = prize.display_key();
    if prize.quantity > 1 {
        out.push_str(&format!(" (x{})", prize.quantity));
    }
    out
}

// ---------------------------------------------------------------------------
// Expansion
// ---------------------------------------------------------------------------

/// Which list a prize entry was drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrizeList {
    Common,
    Configured,
    /// Free text set directly by the operator.
    Adhoc,
}

/// One drawable unit of a prize, remembering the string it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrizeEntry {
    pub display: String,
    pub source: String,
    pub list: PrizeList,
}

impl PrizeEntry {
    pub fn adhoc(text: &str) -> Self {
        Self {
            display: parse_prize(text).display_key(),
            source: text.trim().to_string(),
            list: PrizeList::Adhoc,
        }
    }
}

/// Materialise `quantity` entries for every prize string in `list`.
pub fn expand(list: &[String], kind: PrizeList) -> Vec<PrizeEntry> {
    let mut entries = Vec::new();
    for source in list {
        let prize = parse_prize(source);
        let display = prize.display_key();
        for _ in 0..prize.quantity {
            entries.push(PrizeEntry {
                display: display.clone(),
                source: source.clone(),
                list: kind,
            });
        }
    }
    entries
}

// ---------------------------------------------------------------------------
// PrizePool
// ---------------------------------------------------------------------------

/// The streamer's prize lists. `common` prizes are never consumed;
/// `configured` prizes are used up as they are won.
#[derive(Debug, Clone, Default)]
pub struct PrizePool {
    common: Vec<String>,
    configured: Vec<String>,
}

impl PrizePool {
    pub fn new(common: Vec<String>, configured: Vec<String>) -> Self {
        Self { common, configured }
    }

    pub fn common(&self) -> &[String] {
        &self.common
    }

    pub fn configured(&self) -> &[String] {
        &self.configured
    }

    /// All drawable units, common first.
    pub fn entries(&self) -> Vec<PrizeEntry> {
        let mut all = expand(&self.common, PrizeList::Common);
        all.extend(expand(&self.configured, PrizeList::Configured));
        all
    }

    /// Pick one unit uniformly at random across both lists.
    pub fn pick_random<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<PrizeEntry> {
        self.entries().choose(rng).cloned()
    }

    /// Classify free text against the lists so a later win consumes the
    /// right source string.
    pub fn entry_for(&self, text: &str) -> PrizeEntry {
        let text = text.trim();
        let list = if self.common.iter().any(|s| s.trim() == text) {
            PrizeList::Common
        } else if self.configured.iter().any(|s| s.trim() == text) {
            PrizeList::Configured
        } else {
            PrizeList::Adhoc
        };
        PrizeEntry {
            display: parse_prize(text).display_key(),
            source: text.to_string(),
            list,
        }
    }

    /// Use up one unit of a won prize. Configured strings with a quantity
    /// above one are rewritten with one fewer unit; the last unit removes the
    /// string. Strings that also appear in the common list are left alone.
    /// Returns true when the configured list changed.
    pub fn consume(&mut self, source: &str) -> bool {
        let source = source.trim();
        if self.common.iter().any(|s| s.trim() == source) {
            return false;
        }
        let Some(pos) = self.configured.iter().position(|s| s.trim() == source) else {
            return false;
        };
        let mut prize = parse_prize(&self.configured[pos]);
        if prize.quantity > 1 {
            prize.quantity -= 1;
            self.configured[pos] = format_prize(&prize);
        } else {
            self.configured.remove(pos);
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn prize(name: &str, donator: Option<&str>, quantity: u32) -> Prize {
        Prize {
            name: name.to_string(),
            donator: donator.map(str::to_string),
            quantity,
        }
    }

    #[test]
    fn plain_name() {
        assert_eq!(parse_prize("  Golden Ticket "), prize("Golden Ticket", None, 1));
    }

    #[test]
    fn quantity_token_parenthesised_and_bracketed() {
        assert_eq!(parse_prize("Skin (x3)"), prize("Skin", None, 3));
        assert_eq!(parse_prize("Skin [X 2]"), prize("Skin", None, 2));
    }

    #[test]
    fn donator_with_and_without_prefix() {
        assert_eq!(
            parse_prize("Ship (donated by Bob)"),
            prize("Ship", Some("Bob"), 1)
        );
        assert_eq!(
            parse_prize("Ship [Courtesy of Alice] (x4)"),
            prize("Ship", Some("Alice"), 4)
        );
        assert_eq!(parse_prize("Ship (Carol)"), prize("Ship", Some("Carol"), 1));
        assert_eq!(
            parse_prize("Cheese (Fromage Co)"),
            prize("Cheese", Some("Fromage Co"), 1)
        );
    }

    #[test]
    fn prefix_only_stripped_at_start() {
        assert_eq!(
            parse_prize("Ship (Joe from Corp)"),
            prize("Ship", Some("Joe from Corp"), 1)
        );
    }

    #[test]
    fn empty_name_falls_back_to_full_text() {
        assert_eq!(parse_prize("(x5)"), prize("(x5)", None, 1));
        assert_eq!(parse_prize("(Bob)"), prize("(Bob)", None, 1));
    }

    #[test]
    fn only_last_quantity_token_counts() {
        assert_eq!(parse_prize("Pack (x3) (x2)"), prize("Pack (x3)", None, 2));
    }

    #[test]
    fn zero_quantity_counts_as_one() {
        assert_eq!(parse_prize("Hat (x0)"), prize("Hat", None, 1));
    }

    #[test]
    fn format_then_parse_is_stable() {
        let inputs = [
            "Skin Pack (donated by Bob) (x3)",
            "Ship (Joe from Corp)",
            "Plain",
            "(Bob) (x2)",
            "Hat (from)",
            "Crate [x7]",
            "Pack (x3) (x2)",
            "Weird (thing) name (Dana)",
        ];
        for input in inputs {
            let parsed = parse_prize(input);
            assert_eq!(parse_prize(&format_prize(&parsed)), parsed, "input: {input}");
        }
    }

    #[test]
    fn display_key_includes_donator() {
        assert_eq!(parse_prize("Ship (Bob) (x2)").display_key(), "Ship (Bob)");
    }

    #[test]
    fn expand_repeats_by_quantity() {
        let list = vec!["A (x2)".to_string(), "B (Bob)".to_string()];
        let entries = expand(&list, PrizeList::Configured);
        let displays: Vec<_> = entries.iter().map(|e| e.display.as_str()).collect();
        assert_eq!(displays, vec!["A", "A", "B (Bob)"]);
        assert_eq!(entries[1].source, "A (x2)");
        assert!(entries.iter().all(|e| e.list == PrizeList::Configured));
    }

    #[test]
    fn pick_random_covers_both_lists() {
        let pool = PrizePool::new(vec!["Common".into()], vec!["Rare (x3)".into()]);
        let mut rng = StdRng::seed_from_u64(11);
        let mut saw_common = false;
        let mut saw_configured = false;
        for _ in 0..200 {
            match pool.pick_random(&mut rng).map(|e| e.list) {
                Some(PrizeList::Common) => saw_common = true,
                Some(PrizeList::Configured) => saw_configured = true,
                _ => {}
            }
        }
        assert!(saw_common && saw_configured);
    }

    #[test]
    fn pick_random_on_empty_pool() {
        let pool = PrizePool::default();
        assert!(pool.pick_random(&mut StdRng::seed_from_u64(1)).is_none());
    }

    #[test]
    fn consume_decrements_then_removes() {
        let mut pool = PrizePool::new(vec![], vec!["Ship (Bob) (x2)".into(), "Hat".into()]);
        assert!(pool.consume("Ship (Bob) (x2)"));
        assert_eq!(pool.configured(), &["Ship (Bob)".to_string(), "Hat".to_string()]);
        assert!(pool.consume("Ship (Bob)"));
        assert_eq!(pool.configured(), &["Hat".to_string()]);
    }

    #[test]
    fn consume_leaves_common_prizes() {
        let mut pool = PrizePool::new(vec!["Hat".into()], vec!["Hat".into()]);
        assert!(!pool.consume("Hat"));
        assert_eq!(pool.configured().len(), 1);
    }

    #[test]
    fn entry_for_classifies_lists() {
        let pool = PrizePool::new(vec!["Hat".into()], vec!["Ship".into()]);
        assert_eq!(pool.entry_for("Hat").list, PrizeList::Common);
        assert_eq!(pool.entry_for(" Ship ").list, PrizeList::Configured);
        assert_eq!(pool.entry_for("Boat").list, PrizeList::Adhoc);
    }
}
