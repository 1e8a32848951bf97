//! Loot tables
//!
//! A table is an ordered list of `{ item, chance }` entries where chances are
//! percentages that need not sum to 100. A roll walks the entries in order
//! and the first one whose cumulative chance reaches the draw wins.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Upper bound (exclusive) of a loot draw
pub const DRAW_RANGE: u32 = 100;

/// One loot table entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LootEntry {
    /// Item kind name
    pub item: String,
    /// Percentage chance
    pub chance: u32,
}

/// Ordered loot table of a mob kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LootTable {
    entries: Vec<LootEntry>,
}

impl LootTable {
    pub fn new(entries: Vec<LootEntry>) -> Self {
        Self { entries }
    }

    /// Build a table from `(item, chance)` pairs
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, u32)>) -> Self {
        Self {
            entries: pairs
                .into_iter()
                .map(|(item, chance)| LootEntry {
                    item: item.to_string(),
                    chance,
                })
                .collect(),
        }
    }

    pub fn entries(&self) -> &[LootEntry] {
        &self.entries
    }

    /// Sum of every chance in the table
    pub fn total(&self) -> u32 {
        self.entries.iter().map(|e| e.chance).sum()
    }

    /// Resolve a draw in `[0, 100)` to an item kind, if any
    pub fn roll(&self, draw: u32) -> Option<&str> {
        let mut cumulative = 0u32;
        for entry in &self.entries {
            cumulative += entry.chance;
            if cumulative > draw {
                return Some(&entry.item);
            }
        }
        None
    }

    /// Draw uniformly and resolve
    pub fn roll_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&str> {
        self.roll(rng.gen_range(0..DRAW_RANGE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_roll_walks_cumulative_chances() {
        let table = LootTable::from_pairs([("A", 30), ("B", 20)]);
        let outcomes: Vec<Option<&str>> = [0, 29, 30, 49, 50, 99]
            .iter()
            .map(|&draw| table.roll(draw))
            .collect();
        assert_eq!(
            outcomes,
            vec![Some("A"), Some("A"), Some("B"), Some("B"), None, None]
        );
        assert_eq!(table.total(), 50);
    }

    #[test]
    fn test_empty_table_never_drops() {
        let table = LootTable::default();
        assert_eq!(table.roll(0), None);
    }

    #[test]
    fn test_full_table_always_drops() {
        let table = LootTable::from_pairs([("flask", 60), ("burger", 40)]);
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            assert!(table.roll_with(&mut rng).is_some());
        }
    }

    #[test]
    fn test_deserialize_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            rat: LootTable,
        }
        let wrapper: Wrapper = toml::from_str(
            r#"rat = [{ item = "firepotion", chance = 5 }, { item = "burger", chance = 10 }]"#,
        )
        .unwrap();
        assert_eq!(wrapper.rat.entries().len(), 2);
        assert_eq!(wrapper.rat.roll(7), Some("burger"));
    }
}
