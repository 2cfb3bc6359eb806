use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::Serialize;

use crate::segment::Metric;

/// 一条搜索结果
///
/// `index` 在分段内部为局部下标，在分片管理器中为全局下标
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Neighbor {
    pub score: f32,
    pub index: u64,
}

/// 堆中的元素，`key` 越小越好，相同时先插入的（下标更小）优先
#[derive(Debug, Clone, Copy)]
struct Ranked {
    key: f32,
    neighbor: Neighbor,
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.total_cmp(&other.key).then(self.neighbor.index.cmp(&other.neighbor.index))
    }
}

/// 保留最好的 k 个结果
///
/// 内部是一个大顶堆，堆顶为当前最差的结果，超出 k 个时弹出
pub struct TopK {
    heap: BinaryHeap<Ranked>,
    metric: Metric,
    k: usize,
}

impl TopK {
    pub fn new(metric: Metric, k: usize) -> Self {
        Self { heap: BinaryHeap::with_capacity(k + 1), metric, k }
    }

    pub fn push(&mut self, neighbor: Neighbor) {
        if self.k == 0 {
            return;
        }
        // + 0.0 用于把 -0.0 统一为 0.0，避免 total_cmp 把两者区分开
        let key = match self.metric {
            Metric::Hamming => neighbor.score + 0.,
            Metric::InnerProduct => -neighbor.score + 0.,
        };
        let item = Ranked { key, neighbor };
        if self.heap.len() < self.k {
            self.heap.push(item);
        } else if let Some(mut worst) = self.heap.peek_mut() {
            if item < *worst {
                *worst = item;
            }
        }
    }

    pub fn extend(&mut self, neighbors: impl IntoIterator<Item = Neighbor>) {
        for neighbor in neighbors {
            self.push(neighbor);
        }
    }

    /// 按从好到坏的顺序返回
    pub fn into_sorted_vec(self) -> Vec<Neighbor> {
        self.heap.into_sorted_vec().into_iter().map(|r| r.neighbor).collect()
    }
}
