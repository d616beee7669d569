use crate::models::{Category, DeltaRecord, Window};
use crate::rollup::round_to;

#[derive(Debug, Clone, PartialEq)]
pub struct RankedRow<'a> {
    pub record: &'a DeltaRecord,
    pub ranks: Vec<(Category, u32)>,
}

impl RankedRow<'_> {
    pub fn rank(&self, category: Category) -> Option<u32> {
        self.ranks
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, rank)| *rank)
    }
}

/// Descending competition ranks: tied values share the smallest rank of their block
/// and the next distinct value skips past the block.
pub fn competition_rank(values: &[f64]) -> Vec<u32> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|a, b| values[*b].total_cmp(&values[*a]));

    let mut ranks = vec![0; values.len()];
    let mut current = 0u32;
    for (position, idx) in order.iter().enumerate() {
        if position == 0 || values[*idx] != values[order[position - 1]] {
            current = position as u32 + 1;
        }
        ranks[*idx] = current;
    }
    ranks
}

pub fn rank_table<'a>(
    records: &'a [DeltaRecord],
    window: Window,
    categories: &[Category],
) -> Vec<RankedRow<'a>> {
    let per_category: Vec<(Category, Vec<u32>)> = categories
        .iter()
        .map(|category| {
            let values: Vec<f64> = records.iter().map(|r| r.value(window, *category)).collect();
            (*category, competition_rank(&values))
        })
        .collect();

    records
        .iter()
        .enumerate()
        .map(|(idx, record)| RankedRow {
            record,
            ranks: per_category
                .iter()
                .map(|(category, ranks)| (*category, ranks[idx]))
                .collect(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopEntry {
    pub branch: String,
    pub name: String,
    pub value: f64,
}

/// Every employee sorted by descending delta. Ties keep roster order.
pub fn top_list(records: &[DeltaRecord], window: Window, category: Category) -> Vec<TopEntry> {
    let mut sorted: Vec<(&DeltaRecord, f64)> = records
        .iter()
        .map(|r| (r, r.value(window, category)))
        .collect();
    sorted.sort_by(|a, b| b.1.total_cmp(&a.1));

    sorted
        .into_iter()
        .map(|(record, value)| TopEntry {
            branch: record.entry.branch_label().to_string(),
            name: record.entry.name.clone(),
            value: round_to(value / 10_000.0, 0),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RosterEntry, Volumes};

    fn record(id: &str, name: &str, fund: f64) -> DeltaRecord {
        let mut volumes = Volumes::default();
        volumes.set(Category::Fund, fund);
        DeltaRecord {
            entry: RosterEntry {
                ordinal: None,
                employee_id: id.to_string(),
                name: name.to_string(),
                parent_branch: String::new(),
                branch: Some("北京".to_string()),
                group: "第一组".to_string(),
            },
            windows: vec![(Window::Week, volumes.with_composites())],
        }
    }

    #[test]
    fn ties_share_the_minimum_rank() {
        assert_eq!(competition_rank(&[5.0, 9.0, 5.0, 5.0, 1.0]), vec![2, 1, 2, 2, 5]);
        assert_eq!(competition_rank(&[]), Vec::<u32>::new());
        assert_eq!(competition_rank(&[0.0, 0.0]), vec![1, 1]);
    }

    #[test]
    fn rank_table_ranks_each_category() {
        let records = vec![record("1", "甲", 10.0), record("2", "乙", 30.0), record("3", "丙", 10.0)];
        let rows = rank_table(&records, Window::Week, &[Category::Fund, Category::Insurance]);

        let fund: Vec<u32> = rows.iter().filter_map(|r| r.rank(Category::Fund)).collect();
        assert_eq!(fund, vec![2, 1, 2]);
        let insurance: Vec<u32> = rows.iter().filter_map(|r| r.rank(Category::Insurance)).collect();
        assert_eq!(insurance, vec![1, 1, 1]);
        assert_eq!(rows[0].rank(Category::PreciousMetal), None);
    }

    #[test]
    fn top_list_sorts_descending_and_scales_to_ten_thousands() {
        let records = vec![
            record("1", "甲", 25_000.0),
            record("2", "乙", 149_999.0),
            record("3", "丙", 35_000.0),
            record("4", "丁", 25_000.0),
        ];
        let list = top_list(&records, Window::Week, Category::Fund);

        let names: Vec<&str> = list.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["乙", "丙", "甲", "丁"]);
        let values: Vec<f64> = list.iter().map(|e| e.value).collect();
        assert_eq!(values, vec![15.0, 4.0, 2.0, 2.0]);
        assert_eq!(list[0].branch, "北京");
    }
}
