//! 读请求分块
//!
//! 把请求的寄存器按地址排序后合并为尽量少的连续区间，每个区间一次 FC=04 请求。

use crate::types::{AddressRange, RegisterSpec};
use std::collections::BTreeSet;

/// 单次读请求的默认最大寄存器数
pub const DEFAULT_MAX_BLOCK_WIDTH: u16 = 50;

/// 一个待读取的区间及其覆盖的寄存器
#[derive(Debug, Clone)]
pub struct ReadBlock<'a> {
    pub range: AddressRange,
    pub specs: Vec<&'a RegisterSpec>,
}

/// 分块器
#[derive(Debug, Clone)]
pub struct BlockPlanner {
    max_width: u16,
    no_merge: BTreeSet<u16>,
}

impl BlockPlanner {
    pub fn new(max_width: u16, no_merge: BTreeSet<u16>) -> Self {
        Self {
            max_width: max_width.max(1),
            no_merge,
        }
    }

    pub fn max_width(&self) -> u16 {
        self.max_width
    }

    /// 计算读取区间。
    ///
    /// 仅当下一段紧接当前区间末尾、合并后不超过最大宽度、且合并区间内没有
    /// 不可合并地址时才扩展当前区间。
    pub fn plan<'a>(&self, specs: &[&'a RegisterSpec]) -> Vec<ReadBlock<'a>> {
        let mut sorted: Vec<&'a RegisterSpec> = specs.to_vec();
        sorted.sort_by_key(|spec| spec.address);

        let mut blocks: Vec<ReadBlock<'a>> = Vec::new();
        for spec in sorted {
            let span = AddressRange::new(spec.address, spec.end_address());
            if let Some(current) = blocks.last_mut() {
                if self.can_extend(current.range, span) {
                    current.range.end = span.end;
                    current.specs.push(spec);
                    continue;
                }
            }
            blocks.push(ReadBlock {
                range: span,
                specs: vec![spec],
            });
        }

        blocks
            .into_iter()
            .flat_map(|block| self.split_oversized(block))
            .collect()
    }

    /// 每个 key 单独一个区间（逐 key 读取的回退模式）。
    pub fn plan_per_key<'a>(&self, specs: &[&'a RegisterSpec]) -> Vec<ReadBlock<'a>> {
        let mut sorted: Vec<&'a RegisterSpec> = specs.to_vec();
        sorted.sort_by_key(|spec| spec.address);
        sorted
            .into_iter()
            .flat_map(|spec| {
                self.split_oversized(ReadBlock {
                    range: AddressRange::new(spec.address, spec.end_address()),
                    specs: vec![spec],
                })
            })
            .collect()
    }

    fn can_extend(&self, current: AddressRange, next: AddressRange) -> bool {
        if u32::from(next.start) != u32::from(current.end) + 1 {
            return false;
        }
        if u32::from(next.end) - u32::from(current.start) + 1 > u32::from(self.max_width) {
            return false;
        }
        self.no_merge
            .range(current.start..=next.end)
            .next()
            .is_none()
    }

    /// 单个寄存器宽于最大宽度时按最大宽度切分。
    fn split_oversized<'a>(&self, block: ReadBlock<'a>) -> Vec<ReadBlock<'a>> {
        if block.range.len() <= self.max_width {
            return vec![block];
        }
        let mut parts = Vec::new();
        let mut start = u32::from(block.range.start);
        let end = u32::from(block.range.end);
        while start <= end {
            let part_end = (start + u32::from(self.max_width) - 1).min(end);
            parts.push(ReadBlock {
                range: AddressRange::new(start as u16, part_end as u16),
                specs: block.specs.clone(),
            });
            start = part_end + 1;
        }
        parts
    }
}

impl Default for BlockPlanner {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BLOCK_WIDTH, BTreeSet::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Access, RawType, RegisterFormat};

    fn spec(key: &str, address: u16, word_count: u16) -> RegisterSpec {
        RegisterSpec {
            key: key.to_string(),
            address,
            word_count,
            raw_type: RawType::U16,
            format: RegisterFormat::Raw,
            access: Access::ReadOnly,
        }
    }

    fn words(blocks: &[ReadBlock<'_>]) -> Vec<u16> {
        blocks
            .iter()
            .flat_map(|block| block.range.start..=block.range.end)
            .collect()
    }

    #[test]
    fn isolates_no_merge_addresses() {
        let specs: Vec<RegisterSpec> = (8013..=8020)
            .map(|address| spec(&format!("k{}", address), address, 1))
            .collect();
        let refs: Vec<&RegisterSpec> = specs.iter().collect();
        let planner = BlockPlanner::new(50, [8015, 8016, 8017].into_iter().collect());

        let blocks = planner.plan(&refs);
        let ranges: Vec<AddressRange> = blocks.iter().map(|block| block.range).collect();
        assert_eq!(
            ranges,
            vec![
                AddressRange::new(8013, 8014),
                AddressRange::new(8015, 8015),
                AddressRange::new(8016, 8016),
                AddressRange::new(8017, 8017),
                AddressRange::new(8018, 8020),
            ]
        );
        assert_eq!(words(&blocks), (8013..=8020).collect::<Vec<u16>>());
    }

    #[test]
    fn caps_width_at_fifty() {
        let specs: Vec<RegisterSpec> = (0..120)
            .map(|offset| spec(&format!("k{}", offset), 1000 + offset, 1))
            .collect();
        let refs: Vec<&RegisterSpec> = specs.iter().rev().collect();

        let blocks = BlockPlanner::default().plan(&refs);
        assert!(blocks.iter().all(|block| block.range.len() <= 50));
        let covered = words(&blocks);
        assert_eq!(covered.len(), 120);
        assert!(covered.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(blocks.len(), 3);
    }

    #[test]
    fn never_cuts_multi_word_values() {
        let mut specs = Vec::new();
        for index in 0..30u16 {
            specs.push(spec(&format!("k{}", index), 2000 + index * 2, 2));
        }
        let refs: Vec<&RegisterSpec> = specs.iter().collect();

        let blocks = BlockPlanner::default().plan(&refs);
        assert_eq!(blocks[0].range, AddressRange::new(2000, 2049));
        assert_eq!(blocks[1].range, AddressRange::new(2050, 2059));
        for block in &blocks {
            for spec in &block.specs {
                assert!(block.range.contains(spec.address));
                assert!(block.range.contains(spec.end_address()));
            }
        }
        assert_eq!(words(&blocks).len(), 60);
    }

    #[test]
    fn starts_new_block_when_value_would_cross_cap() {
        // 3000 单字 + 24 个双字 = 49 字，下一个双字会跨过第 50 字
        let mut specs = vec![spec("head", 3000, 1)];
        for index in 0..26u16 {
            specs.push(spec(&format!("k{}", index), 3001 + index * 2, 2));
        }
        let refs: Vec<&RegisterSpec> = specs.iter().collect();

        let blocks = BlockPlanner::default().plan(&refs);
        let ranges: Vec<AddressRange> = blocks.iter().map(|block| block.range).collect();
        assert_eq!(
            ranges,
            vec![AddressRange::new(3000, 3048), AddressRange::new(3049, 3052)]
        );
        assert_eq!(blocks[0].specs.len(), 25);
        assert_eq!(blocks[1].specs.len(), 2);
    }

    #[test]
    fn gaps_break_ranges() {
        let specs = vec![spec("a", 10, 1), spec("b", 12, 2), spec("c", 14, 1)];
        let refs: Vec<&RegisterSpec> = specs.iter().collect();

        let blocks = BlockPlanner::default().plan(&refs);
        let ranges: Vec<AddressRange> = blocks.iter().map(|block| block.range).collect();
        assert_eq!(
            ranges,
            vec![AddressRange::new(10, 10), AddressRange::new(12, 14)]
        );
        assert_eq!(blocks[1].specs.len(), 2);
    }

    #[test]
    fn per_key_mode_reads_each_register_alone() {
        let specs = vec![spec("a", 10, 1), spec("b", 11, 2)];
        let refs: Vec<&RegisterSpec> = specs.iter().collect();

        let blocks = BlockPlanner::default().plan_per_key(&refs);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].range, AddressRange::new(11, 12));
    }

    #[test]
    fn empty_input_plans_nothing() {
        assert!(BlockPlanner::default().plan(&[]).is_empty());
    }
}
