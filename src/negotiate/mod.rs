//! Content negotiation over `Accept`-style header values.
//!
//! A header such as `da, en-gb;q=0.8, en;q=0.7` is parsed into a
//! [`RankedList`] ordered from most to least desirable, which can then pick the
//! best match out of the values a server supports. The router uses it for
//! `Accept-Language`, but the ranking works for media types too
//! (`text/html;level=1`, `image/*`, `*/*`).

use std::cmp::Reverse;
use std::fmt;

use thiserror::Error;

/// Quality of an entry without an explicit `q=`, in thousandths.
pub const MAX_QUALITY: i32 = 1000;

/// Errors produced while parsing a ranked header value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NegotiationError {
    #[error("empty type/parameter list")]
    Empty,

    #[error("invalid quality value '{value}'")]
    InvalidQuality { value: String },

    #[error("parameter '{param}' is not a key=value pair")]
    MalformedParameter { param: String },
}

/// One entry of a ranked header: the tag (with any `;key=value` parameters
/// kept inline) and its quality in thousandths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeParam {
    pub tag: String,
    pub quality: i32,
}

impl TypeParam {
    pub fn new(tag: impl Into<String>, quality: i32) -> Self {
        Self {
            tag: tag.into(),
            quality,
        }
    }

    /// The tag without its parameters.
    pub fn main(&self) -> &str {
        self.tag.split(';').next().unwrap_or_default().trim()
    }

    /// The part after `/` in a `type/subtype` tag.
    pub fn subtype(&self) -> Option<&str> {
        let (_, subtype) = self.main().split_once('/')?;
        (!subtype.contains('/')).then_some(subtype)
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self.main(), "*" | "*/*")
    }

    fn param_count(&self) -> usize {
        self.tag.split(';').count() - 1
    }

    /// Sort key, greatest first: non-wildcards, then quality, then concrete
    /// subtypes before `type/*`, then more parameters, then longer tags.
    fn rank_key(&self) -> (bool, i32, bool, usize, usize) {
        (
            !self.is_wildcard(),
            self.quality,
            self.subtype() != Some("*"),
            self.param_count(),
            self.tag.len(),
        )
    }
}

impl fmt::Display for TypeParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}; q={}", self.tag, f64::from(self.quality) / 1000.0)
    }
}

/// Parsed header entries, most desirable first.
///
/// # Examples
///
/// ```
/// use pathwise::negotiate::RankedList;
///
/// let ranked = RankedList::parse_languages("da, en-gb;q=0.8, en;q=0.7").unwrap();
/// let tags: Vec<_> = ranked.iter().map(|tp| tp.tag.as_str()).collect();
/// assert_eq!(tags, ["da", "en-gb", "en"]);
///
/// assert_eq!(ranked.find_best(["en", "pt"]), Some("en"));
/// assert_eq!(ranked.find_best(["pt"]), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RankedList {
    entries: Vec<TypeParam>,
}

impl RankedList {
    /// Parses a comma separated list of `tag;key=value;q=0.5` entries.
    ///
    /// # Errors
    ///
    /// Fails on an empty header, a `q` outside `0..=1` or not a number, and on
    /// parameters lacking an `=`.
    pub fn parse(header: &str) -> Result<Self, NegotiationError> {
        let mut entries = Vec::new();

        for entry in header.split(',') {
            let mut parts = entry.split(';');
            let tag = parts.next().unwrap_or_default().trim();
            if tag.is_empty() {
                continue;
            }

            let mut full = tag.to_owned();
            let mut quality = MAX_QUALITY;
            for part in parts.map(str::trim) {
                if let Some(raw) = part.strip_prefix("q=") {
                    quality = parse_quality(raw)?;
                } else if part.contains('=') {
                    full.push(';');
                    full.push_str(part);
                } else {
                    return Err(NegotiationError::MalformedParameter {
                        param: part.to_owned(),
                    });
                }
            }
            entries.push(TypeParam::new(full, quality));
        }

        if entries.is_empty() {
            return Err(NegotiationError::Empty);
        }

        let mut list = Self { entries };
        list.sort();
        Ok(list)
    }

    /// Like [`parse`](Self::parse), and adds a bare `lang` entry for every
    /// `lang-REGION` whose family is not listed, carrying the best quality
    /// among its regions.
    pub fn parse_languages(header: &str) -> Result<Self, NegotiationError> {
        let mut list = Self::parse(header)?;

        let mut families: Vec<TypeParam> = Vec::new();
        for tp in &list.entries {
            let Some((family, _)) = tp.main().split_once('-') else {
                continue;
            };
            if list.entries.iter().any(|e| e.tag == family) {
                continue;
            }
            match families.iter_mut().find(|f| f.tag == family) {
                Some(known) => known.quality = known.quality.max(tp.quality),
                None => families.push(TypeParam::new(family, tp.quality)),
            }
        }

        if !families.is_empty() {
            list.entries.extend(families);
            list.sort();
        }
        Ok(list)
    }

    fn sort(&mut self) {
        self.entries.sort_by_cached_key(|tp| Reverse(tp.rank_key()));
    }

    /// Quality of the first entry compatible with `tag`.
    pub fn rank(&self, tag: &str) -> Option<i32> {
        self.entries
            .iter()
            .find(|tp| tags_compatible(&tp.tag, tag))
            .map(|tp| tp.quality)
    }

    /// The supported tag the client likes best. Entries with `q=0` mean "not
    /// acceptable" and never win; on ties the earlier candidate stays.
    pub fn find_best<'s, I>(&self, supported: I) -> Option<&'s str>
    where
        I: IntoIterator<Item = &'s str>,
    {
        let mut best: Option<(TypeParam, &'s str)> = None;
        for candidate in supported {
            let tag = candidate.trim();
            let Some(quality) = self.rank(tag).filter(|q| *q > 0) else {
                continue;
            };
            let scored = TypeParam::new(tag, quality);
            let better = best
                .as_ref()
                .is_none_or(|(current, _)| scored.rank_key() > current.rank_key());
            if better {
                best = Some((scored, tag));
            }
        }
        best.map(|(_, tag)| tag)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TypeParam> {
        self.entries.iter()
    }

    pub fn first(&self) -> Option<&TypeParam> {
        self.entries.first()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a RankedList {
    type Item = &'a TypeParam;
    type IntoIter = std::slice::Iter<'a, TypeParam>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

fn parse_quality(raw: &str) -> Result<i32, NegotiationError> {
    let invalid = || NegotiationError::InvalidQuality {
        value: raw.to_owned(),
    };
    let q: f64 = raw.trim().parse().map_err(|_| invalid())?;
    if !(0.0..=1.0).contains(&q) {
        return Err(invalid());
    }
    Ok((q * 1000.0).round() as i32)
}

/// Whether header entry `pattern` accepts `candidate`.
///
/// `*` accepts anything and `*/*` any `type/subtype`; `type/*` and `*/subtype`
/// accept the matching half. Main tags compare without case. When both sides
/// carry `;key=value` parameters those must be identical.
pub fn tags_compatible(pattern: &str, candidate: &str) -> bool {
    if pattern == candidate {
        return true;
    }

    let pattern = pattern.to_lowercase();
    let candidate = candidate.to_lowercase();
    let mut lparts = pattern.split(';').map(str::trim);
    let mut rparts = candidate.split(';').map(str::trim);
    let lmain = lparts.next().unwrap_or_default();
    let rmain = rparts.next().unwrap_or_default();

    let main_ok = match (lmain.split_once('/'), rmain.split_once('/')) {
        _ if lmain == "*" => !rmain.is_empty(),
        (Some(("*", "*")), Some(_)) => true,
        (Some(("*", lsub)), Some((rtype, rsub))) => !rtype.is_empty() && lsub == rsub,
        (Some((ltype, "*")), Some((rtype, rsub))) => !rsub.is_empty() && ltype == rtype,
        _ => lmain == rmain,
    };
    if !main_ok {
        return false;
    }

    let lparams: Vec<&str> = lparts.collect();
    let rparams: Vec<&str> = rparts.collect();
    lparams.is_empty() || rparams.is_empty() || lparams == rparams
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(list: &RankedList) -> Vec<&str> {
        list.iter().map(|tp| tp.tag.as_str()).collect()
    }

    #[test]
    fn parse_orders_by_quality() {
        let list = RankedList::parse("en;q=0.3, pt-br, fr;q=0.7").unwrap();
        assert_eq!(tags(&list), ["pt-br", "fr", "en"]);
        assert_eq!(list.first().map(|tp| tp.quality), Some(1000));
        assert_eq!(list.iter().map(|tp| tp.quality).collect::<Vec<_>>(), [1000, 700, 300]);
    }

    #[test]
    fn wildcard_ranks_last_whatever_its_quality() {
        let list = RankedList::parse("*, en;q=0.1").unwrap();
        assert_eq!(tags(&list), ["en", "*"]);

        let list = RankedList::parse("*/*, text/html;q=0.2").unwrap();
        assert_eq!(tags(&list), ["text/html", "*/*"]);
    }

    #[test]
    fn media_type_tiebreaks() {
        let list = RankedList::parse("text/*, text/html, text/html;level=1, text/plain").unwrap();
        assert_eq!(
            tags(&list),
            ["text/html;level=1", "text/plain", "text/html", "text/*"]
        );
    }

    #[test]
    fn equal_entries_keep_header_order() {
        let list = RankedList::parse("ab, cd, ef").unwrap();
        assert_eq!(tags(&list), ["ab", "cd", "ef"]);
    }

    #[test]
    fn parse_errors() {
        assert_eq!(RankedList::parse(""), Err(NegotiationError::Empty));
        assert_eq!(RankedList::parse(" , ,"), Err(NegotiationError::Empty));
        assert_eq!(
            RankedList::parse("en;q=abc"),
            Err(NegotiationError::InvalidQuality {
                value: "abc".to_owned()
            })
        );
        assert!(matches!(
            RankedList::parse("en;q=1.5"),
            Err(NegotiationError::InvalidQuality { .. })
        ));
        assert!(matches!(
            RankedList::parse("en;q=-0.1"),
            Err(NegotiationError::InvalidQuality { .. })
        ));
        assert_eq!(
            RankedList::parse("en;level"),
            Err(NegotiationError::MalformedParameter {
                param: "level".to_owned()
            })
        );
    }

    #[test]
    fn quality_is_stored_in_thousandths() {
        let list = RankedList::parse("en;q=0.333, pt;q=0").unwrap();
        assert_eq!(list.rank("en"), Some(333));
        assert_eq!(list.rank("pt"), Some(0));
    }

    #[test]
    fn family_fallback() {
        let list = RankedList::parse_languages("pt-br;q=0.6, pt-pt;q=0.9, en;q=0.5").unwrap();
        assert_eq!(tags(&list), ["pt-pt", "pt", "pt-br", "en"]);
        assert_eq!(list.rank("pt"), Some(900));

        // an explicit family entry is left alone
        let list = RankedList::parse_languages("en-gb, en;q=0.2").unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.rank("en"), Some(200));
    }

    #[test]
    fn find_best_picks_highest_ranked_supported_tag() {
        let list = RankedList::parse_languages("pt").unwrap();
        assert_eq!(list.find_best(["en", "pt"]), Some("pt"));

        let list = RankedList::parse_languages("fr, pt-br;q=0.8, en;q=0.5").unwrap();
        assert_eq!(list.find_best(["en", "pt"]), Some("pt"));

        let list = RankedList::parse_languages("de").unwrap();
        assert_eq!(list.find_best(["en", "pt"]), None);
    }

    #[test]
    fn find_best_with_wildcard_and_refusals() {
        let list = RankedList::parse("*;q=0.1, pt;q=0").unwrap();
        assert_eq!(list.find_best(["pt", "en"]), Some("en"));

        let list = RankedList::parse("*;q=0").unwrap();
        assert_eq!(list.find_best(["pt", "en"]), None);
    }

    #[test]
    fn find_best_ties_keep_first_candidate() {
        let list = RankedList::parse("*").unwrap();
        assert_eq!(list.find_best(["ab", "cd"]), Some("ab"));
    }

    #[test]
    fn compatibility_rules() {
        assert!(tags_compatible("*", "en"));
        assert!(tags_compatible("*/*", "text/html"));
        assert!(!tags_compatible("*/*", "en"));
        assert!(tags_compatible("text/*", "text/plain"));
        assert!(!tags_compatible("text/*", "image/png"));
        assert!(tags_compatible("*/html", "text/html"));
        assert!(tags_compatible("EN", "en"));
        assert!(!tags_compatible("en-gb", "en"));
        assert!(tags_compatible("text/html;level=1", "text/html"));
        assert!(tags_compatible("text/html;level=1", "text/html;level=1"));
        assert!(!tags_compatible("text/html;level=1", "text/html;level=2"));
    }

    #[test]
    fn display_and_subtype() {
        let tp = TypeParam::new("text/html;level=1", 800);
        assert_eq!(tp.to_string(), "text/html;level=1; q=0.8");
        assert_eq!(tp.subtype(), Some("html"));
        assert_eq!(TypeParam::new("en", 1000).to_string(), "en; q=1");
        assert_eq!(TypeParam::new("en", 1000).subtype(), None);
    }
}
