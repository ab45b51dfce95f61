//! Mapping of windowing-layer display identifiers to niri output names
//!
//! The bar's windowing layer names displays after whatever the monitor
//! reports (often the model string, e.g. `"LS27AG55x"`), while niri knows
//! outputs by connector (`"DP-1"`). Neither side offers a reliable join key,
//! so resolution goes through a ladder of heuristics, from strongest to
//! weakest:
//!
//! 1. a cached earlier resolution that still names a live output
//! 2. exact name match
//! 3. substring match in either direction (first output in enumeration
//!    order wins when several match)
//! 4. the one output left unclaimed in a two-output, at-most-two-display
//!    setup
//! 5. with an empty cache and as many displays as outputs, pairing by sorted
//!    position; every live display's pair is cached in the same step
//! 6. the only output there is
//!
//! Every fresh resolution is written to the [`ResolutionCache`]. The cache
//! outlives display registrations, so a display that comes back after a
//! hot-plug gets its old output again.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use niri_bar_config::DisplayHint;
use tracing::debug;

/// Process-scoped record of display → output resolutions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionCache {
    entries: BTreeMap<String, String>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the cache from configured display hints
    pub fn from_hints(hints: &[DisplayHint]) -> Self {
        Self {
            entries: hints
                .iter()
                .map(|hint| (hint.display.clone(), hint.output.clone()))
                .collect(),
        }
    }

    pub fn get(&self, display: &str) -> Option<&str> {
        self.entries.get(display).map(String::as_str)
    }

    /// Record a resolution, overwriting any earlier one for `display`
    pub fn insert(&mut self, display: impl Into<String>, output: impl Into<String>) {
        self.entries.insert(display.into(), output.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(d, o)| (d.as_str(), o.as_str()))
    }
}

/// Which rule produced a resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rule {
    Cached,
    Exact,
    Substring,
    LastUnclaimed,
    Positional,
    OnlyOutput,
}

/// Resolves display identifiers against the current niri outputs
#[derive(Debug, Default)]
pub struct OutputMapper {
    cache: ResolutionCache,
}

impl OutputMapper {
    pub fn new(cache: ResolutionCache) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    /// Give the cache back, e.g. to hand it to the next manager
    pub fn into_cache(self) -> ResolutionCache {
        self.cache
    }

    /// Resolve `display_id` to one of `outputs`
    ///
    /// `live` maps every currently registered display (with or without
    /// `display_id` itself) to its current resolution; it drives the
    /// unclaimed-output and positional rules. Returns `None` when no rule
    /// applies.
    ///
    /// A positional pairing is made for all live displays at once and
    /// written to the cache together, so the displays that registered
    /// earlier pick up their rank from the cache on their next resolve.
    pub fn resolve(
        &mut self,
        display_id: &str,
        outputs: &[String],
        live: &BTreeMap<String, Option<String>>,
    ) -> Option<String> {
        let (output, rule) = self.find(display_id, outputs, live)?;

        match rule {
            Rule::Cached => {}
            Rule::Positional => {
                for (other, paired) in positional_pairs(display_id, outputs, live) {
                    debug!(display = %other, output = %paired, "Paired display by position");
                    self.cache.insert(other, paired.as_str());
                }
            }
            _ => self.cache.insert(display_id, output.clone()),
        }

        debug!(display = %display_id, output = %output, ?rule, "Resolved display to output");
        Some(output)
    }

    fn find(
        &self,
        display_id: &str,
        outputs: &[String],
        live: &BTreeMap<String, Option<String>>,
    ) -> Option<(String, Rule)> {
        if let Some(cached) = self.cache.get(display_id) {
            if outputs.iter().any(|o| o == cached) {
                return Some((cached.to_string(), Rule::Cached));
            }
        }

        if let Some(output) = outputs.iter().find(|o| *o == display_id) {
            return Some((output.clone(), Rule::Exact));
        }

        if !display_id.is_empty() {
            if let Some(output) = outputs
                .iter()
                .filter(|o| !o.is_empty())
                .find(|o| display_id.contains(o.as_str()) || o.contains(display_id))
            {
                return Some((output.clone(), Rule::Substring));
            }
        }

        let others = || live.iter().filter(|(id, _)| id.as_str() != display_id);
        let display_count = others().count() + 1;

        if outputs.len() == 2 && display_count <= 2 {
            let claimed: HashSet<&str> = others()
                .filter_map(|(_, output)| output.as_deref())
                .collect();
            let mut unclaimed = outputs.iter().filter(|o| !claimed.contains(o.as_str()));
            if let (Some(output), None) = (unclaimed.next(), unclaimed.next()) {
                return Some((output.clone(), Rule::LastUnclaimed));
            }
        }

        if self.cache.is_empty() && display_count == outputs.len() {
            if let Some((_, output)) = positional_pairs(display_id, outputs, live)
                .into_iter()
                .find(|(id, _)| *id == display_id)
            {
                return Some((output.clone(), Rule::Positional));
            }
        }

        if let [only] = outputs {
            return Some((only.clone(), Rule::OnlyOutput));
        }

        None
    }
}

/// Pair the live displays (plus `display_id`) with `outputs`, both sorted
fn positional_pairs<'a>(
    display_id: &'a str,
    outputs: &'a [String],
    live: &'a BTreeMap<String, Option<String>>,
) -> Vec<(&'a str, &'a String)> {
    let displays: BTreeSet<&str> = live
        .keys()
        .map(String::as_str)
        .chain(std::iter::once(display_id))
        .collect();
    let mut sorted_outputs: Vec<&String> = outputs.iter().collect();
    sorted_outputs.sort();

    displays.into_iter().zip(sorted_outputs).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outputs(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn live(entries: &[(&str, Option<&str>)]) -> BTreeMap<String, Option<String>> {
        entries
            .iter()
            .map(|(d, o)| (d.to_string(), o.map(str::to_string)))
            .collect()
    }

    #[test]
    fn test_positional_pairing_by_sorted_rank() {
        let outs = outputs(&["HDMI-A-1", "DP-1"]);
        let both = live(&[("VA2246 SERIES", None), ("LS27AG55x", None)]);
        let mut mapper = OutputMapper::default();

        assert_eq!(
            mapper.resolve("VA2246 SERIES", &outs, &both).as_deref(),
            Some("HDMI-A-1")
        );

        let both = live(&[("VA2246 SERIES", Some("HDMI-A-1")), ("LS27AG55x", None)]);
        assert_eq!(mapper.resolve("LS27AG55x", &outs, &both).as_deref(), Some("DP-1"));
    }

    #[test]
    fn test_positional_pairing_independent_of_order() {
        let outs = outputs(&["DP-1", "HDMI-A-1"]);
        let both = live(&[("VA2246 SERIES", None), ("LS27AG55x", None)]);
        let mut mapper = OutputMapper::default();

        assert_eq!(mapper.resolve("LS27AG55x", &outs, &both).as_deref(), Some("DP-1"));

        let both = live(&[("VA2246 SERIES", None), ("LS27AG55x", Some("DP-1"))]);
        assert_eq!(
            mapper.resolve("VA2246 SERIES", &outs, &both).as_deref(),
            Some("HDMI-A-1")
        );
    }

    #[test]
    fn test_positional_pairing_caches_every_live_display() {
        let outs = outputs(&["HDMI-A-1", "DP-2", "DP-1"]);
        let all = live(&[("Alpha", None), ("Beta", None), ("Gamma", None)]);
        let mut mapper = OutputMapper::default();

        assert_eq!(mapper.resolve("Gamma", &outs, &all).as_deref(), Some("HDMI-A-1"));

        assert_eq!(mapper.cache().len(), 3);
        assert_eq!(mapper.cache().get("Alpha"), Some("DP-1"));
        assert_eq!(mapper.cache().get("Beta"), Some("DP-2"));
        assert_eq!(mapper.resolve("Alpha", &outs, &all).as_deref(), Some("DP-1"));
    }

    #[test]
    fn test_lone_display_with_two_outputs_waits() {
        let outs = outputs(&["HDMI-A-1", "DP-1"]);
        let mut mapper = OutputMapper::default();

        let resolved = mapper.resolve("VA2246 SERIES", &outs, &live(&[("VA2246 SERIES", None)]));

        assert_eq!(resolved, None);
        assert!(mapper.cache().is_empty());
    }

    #[test]
    fn test_exact_match() {
        let mut mapper = OutputMapper::default();

        let resolved = mapper.resolve("DP-1", &outputs(&["HDMI-A-1", "DP-1", "DP-2"]), &live(&[]));

        assert_eq!(resolved.as_deref(), Some("DP-1"));
        assert_eq!(mapper.cache().get("DP-1"), Some("DP-1"));
    }

    #[test]
    fn test_substring_match_both_directions() {
        let mut mapper = OutputMapper::default();
        let outs = outputs(&["HDMI-A-1", "DP-1", "DP-2"]);

        assert_eq!(
            mapper.resolve("Dell DP-2 monitor", &outs, &live(&[])).as_deref(),
            Some("DP-2")
        );
        assert_eq!(mapper.resolve("HDMI", &outs, &live(&[])).as_deref(), Some("HDMI-A-1"));
    }

    #[test]
    fn test_substring_first_match_wins() {
        let mut mapper = OutputMapper::default();

        let resolved = mapper.resolve("DP", &outputs(&["DP-2", "DP-1", "HDMI-A-1"]), &live(&[]));

        assert_eq!(resolved.as_deref(), Some("DP-2"));
    }

    #[test]
    fn test_empty_output_name_never_matches() {
        let mut mapper = OutputMapper::new(ResolutionCache::from_hints(&[DisplayHint {
            display: "other".to_string(),
            output: "gone".to_string(),
        }]));

        let resolved = mapper.resolve("VA2246", &outputs(&["", "DP-1", "DP-2"]), &live(&[]));

        assert_eq!(resolved, None);
    }

    #[test]
    fn test_last_unclaimed_output() {
        let mut mapper = OutputMapper::new(ResolutionCache::from_hints(&[DisplayHint {
            display: "LS27AG55x".to_string(),
            output: "DP-1".to_string(),
        }]));
        let outs = outputs(&["HDMI-A-1", "DP-1"]);
        let registered = live(&[("LS27AG55x", Some("DP-1")), ("VA2246 SERIES", None)]);

        let resolved = mapper.resolve("VA2246 SERIES", &outs, &registered);

        assert_eq!(resolved.as_deref(), Some("HDMI-A-1"));
        assert_eq!(mapper.cache().get("VA2246 SERIES"), Some("HDMI-A-1"));
    }

    #[test]
    fn test_last_unclaimed_needs_exactly_two_outputs() {
        let mut mapper = OutputMapper::new(ResolutionCache::from_hints(&[DisplayHint {
            display: "LS27AG55x".to_string(),
            output: "DP-1".to_string(),
        }]));
        let outs = outputs(&["HDMI-A-1", "DP-1", "DP-2"]);
        let registered = live(&[("LS27AG55x", Some("DP-1"))]);

        assert_eq!(mapper.resolve("VA2246 SERIES", &outs, &registered), None);
    }

    #[test]
    fn test_cached_resolution_preferred_and_not_rewritten() {
        let mut cache = ResolutionCache::new();
        cache.insert("DP-1", "HDMI-A-1");
        let mut mapper = OutputMapper::new(cache);

        // Exact match would say DP-1, but the cached answer wins
        let resolved = mapper.resolve("DP-1", &outputs(&["DP-1", "HDMI-A-1"]), &live(&[]));

        assert_eq!(resolved.as_deref(), Some("HDMI-A-1"));
        assert_eq!(mapper.cache().len(), 1);
    }

    #[test]
    fn test_stale_cache_entry_falls_through_and_is_overwritten() {
        let mut cache = ResolutionCache::new();
        cache.insert("LS27AG55x", "DP-3");
        let mut mapper = OutputMapper::new(cache);

        let resolved = mapper.resolve("LS27AG55x", &outputs(&["DP-1"]), &live(&[]));

        assert_eq!(resolved.as_deref(), Some("DP-1"));
        assert_eq!(mapper.cache().get("LS27AG55x"), Some("DP-1"));
    }

    #[test]
    fn test_reregistration_reuses_previous_output() {
        let outs = outputs(&["HDMI-A-1", "DP-1"]);
        let mut mapper = OutputMapper::default();
        let both = live(&[("VA2246 SERIES", None), ("LS27AG55x", None)]);
        let first = mapper.resolve("VA2246 SERIES", &outs, &both);

        // LS27AG55x is unplugged, then VA2246 SERIES comes back alone
        let alone = live(&[("VA2246 SERIES", None)]);
        let second = mapper.resolve("VA2246 SERIES", &outs, &alone);

        assert_eq!(first, second);
        assert_eq!(second.as_deref(), Some("HDMI-A-1"));
    }

    #[test]
    fn test_single_output_fallback() {
        let mut mapper = OutputMapper::new(ResolutionCache::from_hints(&[DisplayHint {
            display: "elsewhere".to_string(),
            output: "DP-9".to_string(),
        }]));

        let resolved = mapper.resolve(
            "Built-in Retina",
            &outputs(&["eDP-1"]),
            &live(&[("Built-in Retina", None), ("Projector", None)]),
        );

        assert_eq!(resolved.as_deref(), Some("eDP-1"));
    }

    #[test]
    fn test_unresolvable_display() {
        let mut mapper = OutputMapper::new(ResolutionCache::from_hints(&[DisplayHint {
            display: "elsewhere".to_string(),
            output: "DP-9".to_string(),
        }]));

        let resolved = mapper.resolve(
            "VA2246 SERIES",
            &outputs(&["HDMI-A-1", "DP-1", "DP-2"]),
            &live(&[("VA2246 SERIES", None)]),
        );

        assert_eq!(resolved, None);
        assert_eq!(mapper.cache().get("VA2246 SERIES"), None);
    }

    #[test]
    fn test_no_outputs_resolves_nothing() {
        let mut mapper = OutputMapper::default();
        assert_eq!(mapper.resolve("DP-1", &[], &live(&[("DP-1", None)])), None);
    }
}
