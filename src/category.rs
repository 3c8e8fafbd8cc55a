//! Category ("rubrica") discovery for filter pickers.

use std::collections::BTreeSet;

use crate::movement::Movement;

/// The distinct, non-empty category labels in `movements`.
///
/// Labels keep their case and are sorted with plain string ordering, so
/// accented labels sort by code point rather than by locale rules.
pub fn list_categories(movements: &[Movement]) -> Vec<String> {
    labels_sorted(movements.iter().map(|movement| movement.category.as_str()))
}

/// Trim, deduplicate and sort raw category labels, dropping blank ones.
///
/// Labels are trimmed the same way movements are at ingestion, so every
/// listed label can be selected.
pub fn labels_sorted<'a>(labels: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    labels
        .into_iter()
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use time::macros::date;

    use super::{labels_sorted, list_categories};
    use crate::movement::{Movement, SignConvention};

    #[test]
    fn lists_distinct_sorted_categories() {
        let movements: Vec<Movement> = ["201-ALUGUEL", "101-SALARIO", "201-ALUGUEL", "Água"]
            .into_iter()
            .map(|category| {
                Movement::new(
                    date!(2024 - 01 - 01),
                    category,
                    dec!(1),
                    SignConvention::AmountSign,
                )
            })
            .collect();

        assert_eq!(
            list_categories(&movements),
            vec!["101-SALARIO", "201-ALUGUEL", "Água"]
        );
    }

    #[test]
    fn keeps_case_and_drops_blank_labels() {
        let labels = labels_sorted(["b", "B", "", "  ", "a"]);

        assert_eq!(labels, vec!["B", "a", "b"]);
    }

    #[test]
    fn padded_labels_collapse_into_one() {
        let labels = labels_sorted(["Aluguel", " Aluguel", "Aluguel ", "\tLuz\n"]);

        assert_eq!(labels, vec!["Aluguel", "Luz"]);
    }

    #[test]
    fn lists_nothing_for_no_movements() {
        assert!(list_categories(&[]).is_empty());
    }
}
