use crate::loadout::definition::Loadout;

/// Pick the loadout that best fits `available_mb` of VRAM.
///
/// Only loadouts whose requirement doesn't exceed the budget are eligible.
/// Among those the largest requirement wins (closest fit), with ties going
/// to the lexicographically smallest id so the choice is reproducible.
#[must_use]
pub fn select_loadout(loadouts: &[Loadout], available_mb: u64) -> Option<&Loadout> {
    loadouts
        .iter()
        .filter(|l| l.vram_mb <= available_mb)
        .max_by(|a, b| a.vram_mb.cmp(&b.vram_mb).then_with(|| b.id.cmp(&a.id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loadout(id: &str, vram_mb: u64) -> Loadout {
        Loadout {
            id: id.to_string(),
            vram_mb,
            description: String::new(),
            models: Vec::new(),
        }
    }

    #[test]
    fn test_closest_fit() {
        let loadouts = vec![loadout("small", 4000), loadout("big", 24000), loadout("mid", 8000)];
        assert_eq!(select_loadout(&loadouts, 12000).unwrap().id, "mid");
        assert_eq!(select_loadout(&loadouts, 8000).unwrap().id, "mid");
        assert_eq!(select_loadout(&loadouts, 100_000).unwrap().id, "big");
    }

    #[test]
    fn test_never_exceeds_budget() {
        let loadouts = vec![loadout("small", 4000), loadout("big", 24000)];
        assert!(select_loadout(&loadouts, 3999).is_none());
        for budget in [0, 4000, 5000, 23999, 24000] {
            if let Some(chosen) = select_loadout(&loadouts, budget) {
                assert!(chosen.vram_mb <= budget);
            }
        }
    }

    #[test]
    fn test_zero_budget_only_zero_requirement() {
        let loadouts = vec![loadout("cpu", 0), loadout("small", 4000)];
        assert_eq!(select_loadout(&loadouts, 0).unwrap().id, "cpu");
        assert!(select_loadout(&loadouts[1..], 0).is_none());
    }

    #[test]
    fn test_tie_breaks_by_id() {
        let loadouts = vec![loadout("b", 8000), loadout("a", 8000)];
        assert_eq!(select_loadout(&loadouts, 8000).unwrap().id, "a");
    }
}
