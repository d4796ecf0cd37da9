//! Declarative synonym table for the lexical scorer.
//!
//! Each group pairs the query words that ask about a topic (`triggers`) with
//! the words a document uses when it answers that topic (`markers`). The
//! scorer folds over the table; adding a topic means adding a row here or a
//! `[[ranking.synonyms]]` entry in the config file.

use kbchat_shared::SynonymGroup;

/// Built-in rows: `(name, triggers, markers)`.
const BUILTIN_GROUPS: &[(&str, &[&str], &[&str])] = &[
    (
        "price",
        &["얼마", "비용", "가격", "price", "cost"],
        &["가격", "비용", "페소", "price", "peso"],
    ),
    (
        "packing-list",
        &["준비물", "챙길거"],
        &["준비물", "필수"],
    ),
];

/// Lowercased synonym groups ready for matching.
#[derive(Debug, Clone)]
pub struct SynonymTable {
    groups: Vec<SynonymGroup>,
}

impl SynonymTable {
    /// The table shipped with the crate.
    pub fn builtin() -> Self {
        Self::from_groups(
            BUILTIN_GROUPS
                .iter()
                .map(|(name, triggers, markers)| SynonymGroup {
                    name: (*name).to_string(),
                    triggers: triggers.iter().map(|t| (*t).to_string()).collect(),
                    markers: markers.iter().map(|m| (*m).to_string()).collect(),
                })
                .collect(),
        )
    }

    /// Build a table from configured groups, normalizing case.
    pub fn from_groups(groups: Vec<SynonymGroup>) -> Self {
        let groups = groups
            .into_iter()
            .map(|g| SynonymGroup {
                name: g.name,
                triggers: g.triggers.iter().map(|t| t.to_lowercase()).collect(),
                markers: g.markers.iter().map(|m| m.to_lowercase()).collect(),
            })
            .collect();
        Self { groups }
    }

    /// Configured groups, or the built-in table when none are configured.
    pub fn from_config(groups: &[SynonymGroup]) -> Self {
        if groups.is_empty() {
            Self::builtin()
        } else {
            Self::from_groups(groups.to_vec())
        }
    }

    pub fn groups(&self) -> &[SynonymGroup] {
        &self.groups
    }

    /// Groups a lowercased token triggers whose markers appear in `haystack`.
    pub fn matching_groups<'a>(
        &'a self,
        token: &'a str,
        haystack: &'a str,
    ) -> impl Iterator<Item = &'a SynonymGroup> + 'a {
        self.groups.iter().filter(move |g| {
            g.triggers.iter().any(|t| t == token)
                && g.markers.iter().any(|m| haystack.contains(m.as_str()))
        })
    }

    /// Synonym bonus for one token: `weight` per group that fires.
    pub fn bonus(&self, token: &str, haystack: &str, weight: u32) -> u32 {
        self.matching_groups(token, haystack)
            .fold(0u32, |acc, _| acc.saturating_add(weight))
    }
}

impl Default for SynonymTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_has_price_and_packing_groups() {
        let table = SynonymTable::builtin();
        let names: Vec<_> = table.groups().iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["price", "packing-list"]);
    }

    #[test]
    fn test_price_trigger_fires_on_currency_marker() {
        let table = SynonymTable::builtin();
        assert_eq!(table.bonus("얼마", "호핑 투어는 2000페소", 1), 1);
        assert_eq!(table.bonus("비용", "입장료 가격 안내", 3), 3);
    }

    #[test]
    fn test_trigger_without_marker_scores_nothing() {
        let table = SynonymTable::builtin();
        assert_eq!(table.bonus("가격", "호핑 준비물 리스트", 1), 0);
    }

    #[test]
    fn test_non_trigger_token_scores_nothing() {
        let table = SynonymTable::builtin();
        assert_eq!(table.bonus("페소", "가격은 2000페소", 1), 0);
    }

    #[test]
    fn test_packing_group_matches_essentials() {
        let table = SynonymTable::builtin();
        assert_eq!(table.bonus("챙길거", "필수 아이템: 아쿠아슈즈", 1), 1);
    }

    #[test]
    fn test_configured_groups_are_lowercased() {
        let table = SynonymTable::from_groups(vec![SynonymGroup {
            name: "schedule".into(),
            triggers: vec!["When".into()],
            markers: vec!["DEPARTS".into()],
        }]);
        assert_eq!(table.bonus("when", "boat departs at 8", 2), 2);
    }

    #[test]
    fn test_bonus_saturates() {
        let table = SynonymTable::from_groups(vec![
            SynonymGroup {
                name: "a".into(),
                triggers: vec!["가격".into()],
                markers: vec!["페소".into()],
            },
            SynonymGroup {
                name: "b".into(),
                triggers: vec!["가격".into()],
                markers: vec!["가격".into()],
            },
        ]);
        assert_eq!(table.bonus("가격", "가격 2000페소", u32::MAX), u32::MAX);
    }

    #[test]
    fn test_empty_config_falls_back_to_builtin() {
        let table = SynonymTable::from_config(&[]);
        assert_eq!(table.groups().len(), BUILTIN_GROUPS.len());
    }
}
