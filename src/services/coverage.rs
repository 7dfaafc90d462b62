//! 覆盖度统计 - 业务能力层
//!
//! 按维度累计"编码 → 命中次数"，并计算零命中的缺口集合。
//! 每次运行从零开始重算，不做跨运行持久化

use std::collections::BTreeMap;

use crate::models::dimension::Dimension;
use crate::models::reference::ReferenceSet;

/// 覆盖度聚合器
///
/// 参考体系中的每个编码都预置零计数，保证缺口可见
#[derive(Debug, Clone, Default)]
pub struct CoverageAggregator {
    counts: BTreeMap<Dimension, BTreeMap<String, usize>>,
    recorded: usize,
}

impl CoverageAggregator {
    /// 用参考体系初始化（所有编码计数为 0）
    pub fn new(references: &[ReferenceSet]) -> Self {
        let mut counts = BTreeMap::new();
        for reference in references {
            let table: BTreeMap<String, usize> = reference
                .entries
                .iter()
                .map(|e| (e.code.clone(), 0))
                .collect();
            counts.insert(reference.dimension, table);
        }
        Self {
            counts,
            recorded: 0,
        }
    }

    /// 记录一次命中
    ///
    /// 参考体系之外的编码也会被计入（Oracle 偶尔会发明编码，
    /// 报表里保留它比丢掉更有用）
    pub fn record(&mut self, dimension: Dimension, code: &str) {
        let table = self.counts.entry(dimension).or_default();
        *table.entry(code.trim().to_string()).or_insert(0) += 1;
        self.recorded += 1;
    }

    /// 某维度的完整计数表
    pub fn counts(&self, dimension: Dimension) -> BTreeMap<String, usize> {
        self.counts.get(&dimension).cloned().unwrap_or_default()
    }

    /// 某维度零命中的编码
    pub fn gaps(&self, dimension: Dimension) -> Vec<String> {
        self.counts
            .get(&dimension)
            .map(|table| {
                table
                    .iter()
                    .filter(|(_, count)| **count == 0)
                    .map(|(code, _)| code.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// 全部维度的计数表
    pub fn all_counts(&self) -> BTreeMap<Dimension, BTreeMap<String, usize>> {
        self.counts.clone()
    }

    /// 全部维度的缺口
    pub fn all_gaps(&self) -> BTreeMap<Dimension, Vec<String>> {
        self.counts
            .keys()
            .map(|dim| (*dim, self.gaps(*dim)))
            .collect()
    }

    /// 已记录的命中总数
    pub fn recorded(&self) -> usize {
        self.recorded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::reference::ReferenceEntry;

    fn topics_reference() -> ReferenceSet {
        let mut reference = ReferenceSet::new(Dimension::AreaTopics);
        for code in ["T1", "T2", "T3"] {
            reference.entries.push(ReferenceEntry {
                code: code.to_string(),
                label: String::new(),
                description: String::new(),
            });
        }
        reference
    }

    #[test]
    fn test_coverage_and_gaps() {
        let mut aggregator = CoverageAggregator::new(&[topics_reference()]);
        aggregator.record(Dimension::AreaTopics, "T1");
        aggregator.record(Dimension::AreaTopics, "T1");
        aggregator.record(Dimension::AreaTopics, "T2");

        let counts = aggregator.counts(Dimension::AreaTopics);
        assert_eq!(counts.get("T1"), Some(&2));
        assert_eq!(counts.get("T2"), Some(&1));
        assert_eq!(counts.get("T3"), Some(&0));
        assert_eq!(aggregator.gaps(Dimension::AreaTopics), vec!["T3".to_string()]);

        // 命中总数等于记录次数
        let sum: usize = counts.values().sum();
        assert_eq!(sum, aggregator.recorded());
    }

    #[test]
    fn test_unknown_code_still_counted() {
        let mut aggregator = CoverageAggregator::new(&[topics_reference()]);
        aggregator.record(Dimension::AreaTopics, "T9");
        assert_eq!(aggregator.counts(Dimension::AreaTopics).get("T9"), Some(&1));
        // 参考体系内的编码仍全部是缺口
        assert_eq!(aggregator.gaps(Dimension::AreaTopics).len(), 3);
    }
}
